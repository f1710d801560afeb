use anyhow::Context as _;

use crate::api::CatalogApi;
use crate::formats::PipelineState;

/// Hands out the catalog session held in the pipeline state, acquiring a new
/// one when none is held or the current one was rejected.
pub struct SessionProvider<'a> {
    api: &'a dyn CatalogApi,
}

impl<'a> SessionProvider<'a> {
    pub fn new(api: &'a dyn CatalogApi) -> Self {
        Self { api }
    }

    pub async fn acquire(&self) -> anyhow::Result<String> {
        let session = self
            .api
            .acquire_session()
            .await
            .context("acquire catalog session")?;
        tracing::info!("acquired catalog session");
        Ok(session)
    }

    pub async fn ensure(&self, state: &mut PipelineState) -> anyhow::Result<String> {
        if let Some(session) = state.session.as_deref() {
            return Ok(session.to_owned());
        }
        self.renew(state).await
    }

    pub async fn renew(&self, state: &mut PipelineState) -> anyhow::Result<String> {
        let session = self.acquire().await?;
        state.session = Some(session.clone());
        Ok(session)
    }
}
