use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::fs;

use crate::formats::{PipelineState, STATE_VERSION};

const STATE_FILE_NAME: &str = "harvest-state.json";

/// Sole owner of durable pipeline progress.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> anyhow::Result<PipelineState>;
    async fn save(&self, state: &PipelineState) -> anyhow::Result<()>;
    async fn reset(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct LocalFsCheckpointStore {
    state_dir: PathBuf,
}

impl LocalFsCheckpointStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }
}

#[async_trait]
impl CheckpointStore for LocalFsCheckpointStore {
    async fn load(&self) -> anyhow::Result<PipelineState> {
        let path = self.state_path();
        let state: Option<PipelineState> = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?;
        let Some(state) = state else {
            return Ok(PipelineState::default());
        };
        if state.version > STATE_VERSION {
            anyhow::bail!(
                "checkpoint version {} is newer than supported version {STATE_VERSION}: {}",
                state.version,
                path.display()
            );
        }
        Ok(state)
    }

    async fn save(&self, state: &PipelineState) -> anyhow::Result<()> {
        write_json_atomic(&self.state_path(), state)
            .await
            .context("write checkpoint")
    }

    async fn reset(&self) -> anyhow::Result<()> {
        write_json_atomic(&self.state_path(), &PipelineState::default())
            .await
            .context("write empty checkpoint")
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

pub(crate) async fn write_json_atomic<T: serde::Serialize + Sync>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
