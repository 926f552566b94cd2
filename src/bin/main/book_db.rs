use std::{fs, path::Path};

use anyhow::{Context, Result};
use bookbits_core::store::ParagraphStore;
use bookbits_fs::{FileParagraphStore, book_id_for_path};
use log::info;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct OpenedBook {
    pub book_id: String,
    pub total_paragraphs: usize,
}

/// Makes sure `path` is in the paragraph cache and returns its id and size.
///
/// A cached copy is reused unless `reimport` is set.
pub(super) fn open_book(
    store: &FileParagraphStore,
    path: &Path,
    book_id: Option<&str>,
    reimport: bool,
) -> Result<OpenedBook> {
    let book_id = book_id
        .map(str::to_string)
        .unwrap_or_else(|| book_id_for_path(path));

    if store.is_cached(&book_id) && !reimport {
        let total_paragraphs = store
            .paragraph_count(&book_id)
            .with_context(|| format!("failed to index cached book {book_id}"))?;
        info!(
            "book-db: reuse cached book_id={} paragraphs={}",
            book_id, total_paragraphs
        );
        return Ok(OpenedBook {
            book_id,
            total_paragraphs,
        });
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let total_paragraphs = store
        .import_text(&book_id, &raw)
        .with_context(|| format!("failed to cache book {book_id}"))?;
    info!(
        "book-db: imported book_id={} paragraphs={} bytes={}",
        book_id,
        total_paragraphs,
        raw.len()
    );
    Ok(OpenedBook {
        book_id,
        total_paragraphs,
    })
}
