use std::io;
use std::path::Path;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::process::Command;

use crate::config::CwebpConfig;

/// Converts a downloaded image into the WebP file served by the app.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Fails when the transcoder cannot run at all, before any download starts.
    async fn ensure_available(&self) -> anyhow::Result<()>;
    async fn transcode(&self, input: &Path, output: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct CwebpTranscoder {
    config: CwebpConfig,
}

impl CwebpTranscoder {
    pub fn new(config: CwebpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transcoder for CwebpTranscoder {
    async fn ensure_available(&self) -> anyhow::Result<()> {
        match Command::new(&self.config.bin).arg("-version").output().await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => anyhow::bail!(
                "`{}` was not found; install libwebp or pass `--cwebp <PATH>`",
                self.config.bin
            ),
            Err(err) => Err(err).with_context(|| format!("run cwebp: {}", self.config.bin)),
        }
    }

    async fn transcode(&self, input: &Path, output: &Path) -> anyhow::Result<()> {
        let quality = self.config.quality.to_string();
        let result = Command::new(&self.config.bin)
            .args(["-quiet", "-q", quality.as_str()])
            .arg(input)
            .arg("-o")
            .arg(output)
            .output()
            .await
            .with_context(|| format!("run cwebp: {}", self.config.bin))?;

        if !result.status.success() {
            anyhow::bail!(
                "cwebp failed ({}) for {}: {}",
                result.status,
                input.display(),
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }
        Ok(())
    }
}
