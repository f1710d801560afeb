use crate::config::ApiConfig;
use crate::formats::{ApiDescriptor, PipelineState};
use crate::pipeline::PhaseContext;
use crate::session::SessionProvider;

/// The catalog endpoint a harvest is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTarget {
    pub api_base: String,
    pub store_id: String,
    pub category: String,
}

impl From<&ApiConfig> for CatalogTarget {
    fn from(config: &ApiConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            store_id: config.store_id.clone(),
            category: config.category.clone(),
        }
    }
}

impl CatalogTarget {
    fn matches(&self, descriptor: &ApiDescriptor) -> bool {
        descriptor.api_base == self.api_base
            && descriptor.store_id == self.store_id
            && descriptor.category == self.category
    }
}

/// Confirms the catalog answers with a session and records which endpoint the
/// checkpoint belongs to.
pub async fn run(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
    target: &CatalogTarget,
) -> anyhow::Result<()> {
    if let Some(descriptor) = &state.discovered_api {
        if target.matches(descriptor) {
            tracing::info!(
                phase = "discovery",
                api_base = %descriptor.api_base,
                "api already discovered, skipping"
            );
            return Ok(());
        }
        tracing::warn!(
            phase = "discovery",
            previous = %descriptor.api_base,
            current = %target.api_base,
            "catalog endpoint changed; dropping held session"
        );
        state.session = None;
    }

    let sessions = SessionProvider::new(ctx.api);
    if let Err(err) = sessions.renew(state).await {
        ctx.save_after_failure(state).await;
        return Err(err);
    }

    state.discovered_api = Some(ApiDescriptor {
        api_base: target.api_base.clone(),
        store_id: target.store_id.clone(),
        category: target.category.clone(),
        discovered_at: chrono::Utc::now().to_rfc3339(),
    });
    ctx.store.save(state).await?;
    tracing::info!(
        phase = "discovery",
        api_base = %target.api_base,
        category = %target.category,
        "api discovery complete"
    );
    Ok(())
}
