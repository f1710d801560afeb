use anyhow::Context as _;

use crate::formats::{Book, BrowseResponse, PipelineState, RawBrowseRow};
use crate::pipeline::{Pacer, PhaseContext};
use crate::session::SessionProvider;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub skipped: bool,
    pub pages: usize,
    pub added: usize,
}

/// Pages through the catalog until the offset range is covered or an empty
/// page shows the catalog is exhausted.
pub async fn run(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
) -> anyhow::Result<CollectReport> {
    if state.book_list_complete && !state.books.is_empty() {
        tracing::info!(
            phase = "list",
            books = state.books.len(),
            "book list already complete, skipping"
        );
        return Ok(CollectReport {
            skipped: true,
            ..Default::default()
        });
    }

    match collect(state, ctx).await {
        Ok(report) => Ok(report),
        Err(err) => {
            ctx.save_after_failure(state).await;
            Err(err)
        }
    }
}

async fn collect(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
) -> anyhow::Result<CollectReport> {
    let sessions = SessionProvider::new(ctx.api);
    sessions.ensure(state).await?;

    let page_size = ctx.settings.page_size;
    let save_every = ctx.settings.list_save_every_pages.max(1);
    let mut pacer = Pacer::new(ctx.settings.list_delay);
    let mut report = CollectReport::default();
    let mut exhausted = false;

    let max_offset = match (state.max_offset, state.books.is_empty()) {
        (Some(max_offset), false) => max_offset,
        _ => {
            let page = fetch_page(state, ctx, &sessions, &mut pacer, 0).await?;
            // Without a reported bound only an empty page ends the traversal.
            let max_offset = page.max_offset.unwrap_or(u64::MAX);
            state.max_offset = Some(max_offset);
            exhausted = page.rows.is_empty();
            report.pages += 1;
            report.added += ingest(state, page);
            tracing::info!(
                phase = "list",
                max_offset,
                books = state.books.len(),
                "fetched first catalog page"
            );
            max_offset
        }
    };

    let mut offset = state.books.len() as u64;
    while !exhausted && offset < max_offset {
        let page = fetch_page(state, ctx, &sessions, &mut pacer, offset).await?;
        report.pages += 1;

        if page.rows.is_empty() {
            tracing::info!(phase = "list", offset, "empty page; catalog exhausted");
            exhausted = true;
        } else {
            report.added += ingest(state, page);
            tracing::info!(
                phase = "list",
                offset,
                max_offset,
                books = state.books.len(),
                "fetching book list"
            );
        }

        if report.pages % save_every == 0 {
            ctx.store.save(state).await?;
        }
        offset = offset.saturating_add(page_size);
    }

    state.book_list_complete = true;
    ctx.store.save(state).await?;
    tracing::info!(phase = "list", books = state.books.len(), "book list complete");
    Ok(report)
}

async fn fetch_page(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
    sessions: &SessionProvider<'_>,
    pacer: &mut Pacer,
    offset: u64,
) -> anyhow::Result<BrowseResponse> {
    let mut renewed = false;
    loop {
        let session = sessions.ensure(state).await?;
        pacer.wait().await;
        match ctx.api.browse(&session, offset, ctx.settings.page_size).await {
            Ok(page) => return Ok(page),
            Err(err) if err.is_unauthorized() && !renewed => {
                tracing::warn!(
                    phase = "list",
                    offset,
                    error = %err,
                    "session rejected; renewing and retrying page"
                );
                sessions.renew(state).await?;
                renewed = true;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("fetch catalog page at offset {offset}"));
            }
        }
    }
}

fn ingest(state: &mut PipelineState, page: BrowseResponse) -> usize {
    let books = page
        .rows
        .into_iter()
        .filter_map(|row| match RawBrowseRow::parse(row) {
            Ok(book) => Some(book),
            Err(err) => {
                tracing::warn!(
                    phase = "list",
                    error = %format!("{err:#}"),
                    "skipping catalog row"
                );
                None
            }
        });
    state.append_new_books(books.collect::<Vec<Book>>())
}
