use crate::error::ApiError;
use crate::formats::{ItemDetailResponse, PipelineState};
use crate::pipeline::{Pacer, PhaseContext};
use crate::session::SessionProvider;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub enriched: usize,
    pub failed: usize,
}

/// Fetches interior page descriptors for every book not yet enriched.
///
/// A book that cannot be enriched is recorded with no interior images and
/// still counts as done, so one bad item never blocks the phase.
pub async fn run(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
) -> anyhow::Result<EnrichReport> {
    let pending = state.pending_details();
    if pending.is_empty() {
        tracing::info!(phase = "detail", "all book details already fetched, skipping");
        return Ok(EnrichReport::default());
    }

    match enrich(state, ctx, &pending).await {
        Ok(report) => Ok(report),
        Err(err) => {
            ctx.save_after_failure(state).await;
            Err(err)
        }
    }
}

async fn enrich(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
    pending: &[String],
) -> anyhow::Result<EnrichReport> {
    tracing::info!(
        phase = "detail",
        pending = pending.len(),
        total = state.books.len(),
        "fetching book details"
    );

    let sessions = SessionProvider::new(ctx.api);
    sessions.ensure(state).await?;

    let save_every = ctx.settings.detail_save_every_items.max(1);
    let mut pacer = Pacer::new(ctx.settings.detail_delay);
    let mut report = EnrichReport::default();

    for (index, id) in pending.iter().enumerate() {
        let cover_cache = match state.books.iter().find(|b| &b.id == id) {
            Some(book) => book.cover_image_cache.clone(),
            None => continue,
        };

        let interior_images = match fetch_detail(state, ctx, &sessions, &mut pacer, id).await? {
            Ok(detail) => {
                report.enriched += 1;
                detail.interior_images(&cover_cache)
            }
            Err(err) => {
                tracing::warn!(
                    phase = "detail",
                    id = %id,
                    error = %format!("{err:#}"),
                    "detail fetch failed; recording no interior images"
                );
                report.failed += 1;
                Vec::new()
            }
        };

        if let Some(book) = state.book_mut(id) {
            book.interior_images = interior_images;
        }
        state.details_fetched.insert(id.clone());

        let done = index + 1;
        if done % save_every == 0 || done == pending.len() {
            tracing::info!(
                phase = "detail",
                done,
                pending = pending.len(),
                percent = %format!("{:.1}", done as f64 * 100.0 / pending.len() as f64),
                "fetching details"
            );
            ctx.store.save(state).await?;
        }
    }

    ctx.store.save(state).await?;
    tracing::info!(
        phase = "detail",
        fetched = state.details_fetched.len(),
        enriched = report.enriched,
        failed = report.failed,
        "details complete"
    );
    Ok(report)
}

/// The outer result carries fatal errors (no session obtainable); the inner
/// one is the per-item outcome.
async fn fetch_detail(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
    sessions: &SessionProvider<'_>,
    pacer: &mut Pacer,
    id: &str,
) -> anyhow::Result<Result<ItemDetailResponse, ApiError>> {
    let session = sessions.ensure(state).await?;
    pacer.wait().await;
    match ctx.api.item_detail(&session, id).await {
        Err(err) if err.is_unauthorized() => {
            tracing::warn!(
                phase = "detail",
                id,
                error = %err,
                "session rejected; renewing and retrying item"
            );
            let session = sessions.renew(state).await?;
            pacer.wait().await;
            Ok(ctx.api.item_detail(&session, id).await)
        }
        outcome => Ok(outcome),
    }
}
