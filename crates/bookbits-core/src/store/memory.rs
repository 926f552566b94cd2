use std::collections::HashMap;

use log::debug;
use parking_lot::RwLock;

use super::{ParagraphStore, StoreError, validate_paragraphs};
use crate::text::segment;

/// In-memory paragraph store for tests, demos and pre-extracted content.
#[derive(Debug, Default)]
pub struct MemoryParagraphStore {
    books: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryParagraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `paragraphs` for `book_id`, replacing any previous content.
    pub fn insert_book<I, S>(&self, book_id: &str, paragraphs: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paragraphs: Vec<String> = paragraphs.into_iter().map(Into::into).collect();
        validate_paragraphs(&paragraphs)?;
        let count = paragraphs.len();
        self.books.write().insert(book_id.to_string(), paragraphs);
        debug!("store-mem: insert book_id={} paragraphs={}", book_id, count);
        Ok(count)
    }

    /// Segments raw prose and stores the resulting paragraphs.
    pub fn insert_text(&self, book_id: &str, text: &str) -> usize {
        let paragraphs = segment(text);
        let count = paragraphs.len();
        self.books.write().insert(book_id.to_string(), paragraphs);
        count
    }

    pub fn remove_book(&self, book_id: &str) -> bool {
        self.books.write().remove(book_id).is_some()
    }
}

impl ParagraphStore for MemoryParagraphStore {
    fn paragraph(&self, book_id: &str, index: usize) -> Result<String, StoreError> {
        let books = self.books.read();
        let paragraphs = books
            .get(book_id)
            .ok_or_else(|| StoreError::unknown_book(book_id))?;
        paragraphs
            .get(index)
            .cloned()
            .ok_or_else(|| StoreError::not_found(book_id, index, paragraphs.len()))
    }

    fn paragraph_range(
        &self,
        book_id: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        let books = self.books.read();
        let paragraphs = books
            .get(book_id)
            .ok_or_else(|| StoreError::unknown_book(book_id))?;
        if start > paragraphs.len() {
            return Err(StoreError::StartBeyondEnd {
                book_id: book_id.to_string(),
                start,
                available: paragraphs.len(),
            });
        }

        Ok(paragraphs.iter().skip(start).take(count).cloned().collect())
    }

    fn paragraph_count(&self, book_id: &str) -> Result<usize, StoreError> {
        self.books
            .read()
            .get(book_id)
            .map(Vec::len)
            .ok_or_else(|| StoreError::unknown_book(book_id))
    }
}
