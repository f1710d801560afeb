use std::time::Duration;

use anyhow::Context as _;

use crate::api::{BookManagerClient, CatalogApi};
use crate::checkpoint::{CheckpointStore, LocalFsCheckpointStore};
use crate::cli::{Cli, Phase};
use crate::config::{HarvestConfig, HarvestSettings};
use crate::discovery::CatalogTarget;
use crate::emit::EmitReport;
use crate::formats::PipelineState;
use crate::transcode::{CwebpTranscoder, Transcoder};

/// Shared handles every phase works through.
#[derive(Clone, Copy)]
pub struct PhaseContext<'a> {
    pub api: &'a dyn CatalogApi,
    pub store: &'a dyn CheckpointStore,
    pub settings: &'a HarvestSettings,
}

impl PhaseContext<'_> {
    /// Saves on the error path; the original error wins over a failed save.
    pub async fn save_after_failure(&self, state: &PipelineState) {
        if let Err(err) = self.store.save(state).await {
            tracing::error!(error = %format!("{err:#}"), "failed to save checkpoint after error");
        }
    }
}

/// Sleeps between consecutive remote calls, never before the first one.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    primed: bool,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            primed: false,
        }
    }

    pub async fn wait(&mut self) {
        if self.primed && !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.primed = true;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub reset: bool,
    pub only: Option<Phase>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub books: usize,
    pub details_fetched: usize,
    pub images_downloaded: usize,
    pub emitted: Option<EmitReport>,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total books: {}", self.books)?;
        writeln!(f, "Details fetched: {}", self.details_fetched)?;
        write!(f, "Images downloaded: {}", self.images_downloaded)?;
        if let Some(emitted) = &self.emitted {
            write!(
                f,
                "\nDataset: {} books ({} hidden)",
                emitted.books, emitted.hidden
            )?;
        }
        Ok(())
    }
}

pub struct Pipeline<'a> {
    pub ctx: PhaseContext<'a>,
    pub transcoder: &'a dyn Transcoder,
    pub target: CatalogTarget,
}

impl Pipeline<'_> {
    pub async fn run(&self, options: RunOptions) -> anyhow::Result<Summary> {
        if options.reset {
            tracing::info!("resetting harvest state");
            self.ctx.store.reset().await.context("reset checkpoint")?;
        }

        let mut state = self.ctx.store.load().await.context("load checkpoint")?;
        match self.run_phases(&mut state, options.only).await {
            Ok(emitted) => Ok(Summary {
                books: state.books.len(),
                details_fetched: state.details_fetched.len(),
                images_downloaded: state.images_downloaded.len(),
                emitted,
            }),
            Err(err) => {
                self.ctx.save_after_failure(&state).await;
                Err(err)
            }
        }
    }

    async fn run_phases(
        &self,
        state: &mut PipelineState,
        only: Option<Phase>,
    ) -> anyhow::Result<Option<EmitReport>> {
        let selected = |phase: Phase| only.is_none_or(|only| only == phase);
        let mut emitted = None;

        if selected(Phase::Discovery) {
            tracing::info!(phase = %Phase::Discovery, "--- phase 1: api discovery ---");
            crate::discovery::run(state, &self.ctx, &self.target)
                .await
                .context("discovery phase")?;
        }
        if selected(Phase::List) {
            tracing::info!(phase = %Phase::List, "--- phase 2: book list ---");
            crate::collect::run(state, &self.ctx)
                .await
                .context("list phase")?;
        }
        if selected(Phase::Detail) {
            tracing::info!(phase = %Phase::Detail, "--- phase 3: book details ---");
            crate::enrich::run(state, &self.ctx)
                .await
                .context("detail phase")?;
        }
        if selected(Phase::Images) {
            tracing::info!(phase = %Phase::Images, "--- phase 4: images ---");
            crate::images::run(state, &self.ctx, self.transcoder)
                .await
                .context("images phase")?;
            emitted = Some(
                crate::emit::run(state, self.ctx.settings)
                    .await
                    .context("emit dataset")?,
            );
        }

        Ok(emitted)
    }
}

pub async fn run(cli: &Cli) -> anyhow::Result<Summary> {
    let config = HarvestConfig::from_cli(cli).context("resolve config")?;
    tracing::debug!(?config, "resolved config");

    let client = BookManagerClient::new(config.api.clone())?;
    let store = LocalFsCheckpointStore::new(&config.state_dir);
    let transcoder = CwebpTranscoder::new(config.cwebp.clone());

    let pipeline = Pipeline {
        ctx: PhaseContext {
            api: &client,
            store: &store,
            settings: &config.settings,
        },
        transcoder: &transcoder,
        target: CatalogTarget::from(&config.api),
    };

    pipeline
        .run(RunOptions {
            reset: cli.reset,
            only: cli.phase,
        })
        .await
}
