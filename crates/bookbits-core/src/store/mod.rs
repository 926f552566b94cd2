//! Line-addressable paragraph storage contract.

mod memory;

pub use memory::MemoryParagraphStore;

use std::io;

/// Errors raised by a [`ParagraphStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("book {book_id:?} is not in the store")]
    UnknownBook { book_id: String },

    /// The index is past the stored paragraphs, which means a truncated or
    /// corrupted cache.
    #[error("paragraph {index} not found in book {book_id:?} ({available} stored)")]
    NotFound {
        book_id: String,
        index: usize,
        available: usize,
    },

    #[error("range start {start} is beyond the {available} paragraphs of book {book_id:?}")]
    StartBeyondEnd {
        book_id: String,
        start: usize,
        available: usize,
    },

    #[error("paragraph {index} contains a line break and cannot be stored as one line")]
    InvalidParagraph { index: usize },

    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn not_found(book_id: &str, index: usize, available: usize) -> Self {
        Self::NotFound {
            book_id: book_id.to_string(),
            index,
            available,
        }
    }

    pub fn unknown_book(book_id: &str) -> Self {
        Self::UnknownBook {
            book_id: book_id.to_string(),
        }
    }
}

/// Persistent store holding one paragraph per line, queried by index.
///
/// Readers are called from the buffer worker thread, so implementations must
/// be shareable across threads.
pub trait ParagraphStore: Send + Sync {
    /// Paragraph at `index`, or [`StoreError::NotFound`] when the book holds
    /// fewer paragraphs.
    fn paragraph(&self, book_id: &str, index: usize) -> Result<String, StoreError>;

    /// Up to `count` paragraphs starting at `start`; truncated at the end of
    /// the book.
    fn paragraph_range(
        &self,
        book_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Number of paragraphs stored for `book_id`.
    fn paragraph_count(&self, book_id: &str) -> Result<usize, StoreError>;
}

impl<S: ParagraphStore + ?Sized> ParagraphStore for std::sync::Arc<S> {
    fn paragraph(&self, book_id: &str, index: usize) -> Result<String, StoreError> {
        (**self).paragraph(book_id, index)
    }

    fn paragraph_range(
        &self,
        book_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        (**self).paragraph_range(book_id, start, count)
    }

    fn paragraph_count(&self, book_id: &str) -> Result<usize, StoreError> {
        (**self).paragraph_count(book_id)
    }
}

/// Rejects paragraphs that would not round-trip as a single stored line.
pub fn validate_paragraphs<S: AsRef<str>>(paragraphs: &[S]) -> Result<(), StoreError> {
    match paragraphs
        .iter()
        .position(|paragraph| paragraph.as_ref().contains(['\n', '\r']))
    {
        Some(index) => Err(StoreError::InvalidParagraph { index }),
        None => Ok(()),
    }
}
