use std::collections::HashSet;

use anyhow::Context as _;

use crate::checkpoint::write_json_atomic;
use crate::config::HarvestSettings;
use crate::formats::{Book, EmittedBook, PipelineState};
use crate::images::{book_dir, cover_file_name, page_file_name};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub books: usize,
    pub hidden: usize,
}

/// Writes `books.json` from the harvested state.
pub async fn run(state: &PipelineState, settings: &HarvestSettings) -> anyhow::Result<EmitReport> {
    let entries = build_dataset(&state.books, settings);
    let report = EmitReport {
        books: entries.len(),
        hidden: entries.iter().filter(|e| e.hidden).count(),
    };

    write_json_atomic(&settings.dataset_path, &entries)
        .await
        .with_context(|| format!("write dataset: {}", settings.dataset_path.display()))?;

    tracing::info!(
        phase = "emit",
        books = report.books,
        hidden = report.hidden,
        path = %settings.dataset_path.display(),
        "generated dataset"
    );
    Ok(report)
}

pub fn build_dataset(books: &[Book], settings: &HarvestSettings) -> Vec<EmittedBook> {
    // Page boundaries in the catalog API can overlap.
    let mut seen = HashSet::new();
    books
        .iter()
        .filter(|book| seen.insert(book.id.as_str()))
        .map(|book| emit_book(book, settings))
        .collect()
}

fn emit_book(book: &Book, settings: &HarvestSettings) -> EmittedBook {
    let dir = book_dir(&settings.images_dir, &book.id);

    let interior_images = (1..=book.interior_images.len())
        .map(page_file_name)
        .filter(|name| dir.join(name).is_file())
        .map(|name| relative_image_path(&book.id, &name))
        .collect::<Vec<_>>();

    let dimensions = crate::webp::file_dimensions(&dir.join(cover_file_name()));

    EmittedBook {
        id: book.id.clone(),
        title: book.title.clone(),
        cover_image: relative_image_path(&book.id, cover_file_name()),
        hidden: interior_images.is_empty(),
        interior_images,
        cover_width: dimensions.map(|d| d.width),
        cover_height: dimensions.map(|d| d.height),
    }
}

fn relative_image_path(id: &str, file_name: &str) -> String {
    format!("images/{id}/{file_name}")
}
