use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::fs;

use crate::formats::{Book, PipelineState};
use crate::pipeline::{Pacer, PhaseContext};
use crate::transcode::Transcoder;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImagesReport {
    pub completed_books: usize,
    pub failed_books: usize,
    pub files_downloaded: usize,
}

pub fn book_dir(images_dir: &Path, id: &str) -> PathBuf {
    images_dir.join(id)
}

pub fn cover_file_name() -> &'static str {
    "cover.webp"
}

/// Interior pages are numbered from 1.
pub fn page_file_name(page: usize) -> String {
    format!("page-{page}.webp")
}

/// Downloads and transcodes every image of every book not yet complete.
///
/// A book is marked complete only once its cover and all interior pages exist
/// as WebP files. Files already on disk are not downloaded again.
pub async fn run(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
    transcoder: &dyn Transcoder,
) -> anyhow::Result<ImagesReport> {
    let pending = state.pending_images();
    if pending.is_empty() {
        tracing::info!(phase = "images", "all images already downloaded, skipping");
        return Ok(ImagesReport::default());
    }

    match download_all(state, ctx, transcoder, &pending).await {
        Ok(report) => Ok(report),
        Err(err) => {
            ctx.save_after_failure(state).await;
            Err(err)
        }
    }
}

async fn download_all(
    state: &mut PipelineState,
    ctx: &PhaseContext<'_>,
    transcoder: &dyn Transcoder,
    pending: &[String],
) -> anyhow::Result<ImagesReport> {
    transcoder
        .ensure_available()
        .await
        .context("check transcoder")?;
    tracing::info!(phase = "images", books = pending.len(), "downloading images");

    let save_every = ctx.settings.image_save_every_books.max(1);
    let mut pacer = Pacer::new(ctx.settings.image_delay);
    let mut report = ImagesReport::default();

    for (index, id) in pending.iter().enumerate() {
        let Some(book) = state.books.iter().find(|b| &b.id == id).cloned() else {
            continue;
        };

        let dir = book_dir(&ctx.settings.images_dir, &book.id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create image dir: {}", dir.display()))?;

        match download_book(ctx, transcoder, &mut pacer, &book, &dir, &mut report).await {
            Ok(()) => {
                state.images_downloaded.insert(book.id.clone());
                report.completed_books += 1;
            }
            Err(err) => {
                report.failed_books += 1;
                tracing::warn!(
                    phase = "images",
                    id = %book.id,
                    error = %format!("{err:#}"),
                    "image download failed; book left for the next run"
                );
            }
        }

        let done = index + 1;
        if done % save_every == 0 || done == pending.len() {
            tracing::info!(
                phase = "images",
                done,
                books = pending.len(),
                files = report.files_downloaded,
                "downloading images"
            );
            ctx.store.save(state).await?;
        }
    }

    ctx.store.save(state).await?;
    tracing::info!(
        phase = "images",
        files = report.files_downloaded,
        completed = report.completed_books,
        failed = report.failed_books,
        "image download complete"
    );
    Ok(report)
}

async fn download_book(
    ctx: &PhaseContext<'_>,
    transcoder: &dyn Transcoder,
    pacer: &mut Pacer,
    book: &Book,
    dir: &Path,
    report: &mut ImagesReport,
) -> anyhow::Result<()> {
    let cover_url = ctx.api.cover_url(&book.id, &book.cover_image_cache);
    if fetch_image(ctx, transcoder, pacer, &cover_url, &dir.join(cover_file_name()))
        .await
        .context("cover")?
    {
        report.files_downloaded += 1;
    }

    for (index, image) in book.interior_images.iter().enumerate() {
        let page = index + 1;
        let url = ctx.api.interior_url(&book.id, image);
        if fetch_image(ctx, transcoder, pacer, &url, &dir.join(page_file_name(page)))
            .await
            .with_context(|| format!("page {page}"))?
        {
            report.files_downloaded += 1;
        }
    }

    Ok(())
}

/// Returns whether a download happened; an existing target is left alone.
async fn fetch_image(
    ctx: &PhaseContext<'_>,
    transcoder: &dyn Transcoder,
    pacer: &mut Pacer,
    url: &str,
    target: &Path,
) -> anyhow::Result<bool> {
    if fs::try_exists(target)
        .await
        .with_context(|| format!("stat: {}", target.display()))?
    {
        return Ok(false);
    }

    pacer.wait().await;
    let bytes = ctx.api.download(url).await?;

    let raw = target.with_extension("jpg");
    fs::write(&raw, &bytes)
        .await
        .with_context(|| format!("write raw image: {}", raw.display()))?;
    transcoder.transcode(&raw, target).await?;
    fs::remove_file(&raw)
        .await
        .with_context(|| format!("remove raw image: {}", raw.display()))?;
    Ok(true)
}
