use crate::settings::PaginationConfig;

use super::splitter::compute_end_offsets;

/// Why a chunk ended. Narration uses it to pick a pause length.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ChunkEndType {
    /// Last chunk of the paragraph.
    ParagraphEnd,
    /// Ended on `.`, `!` or `?`.
    SentenceEnd,
    /// Ended on `:`, `;`, `,` or a space chosen to respect the length limit.
    SoftBreak,
    /// No usable break; cut at the length limit.
    CharacterLimit,
}

impl ChunkEndType {
    fn from_last_char(ch: char) -> Self {
        match ch {
            '.' | '!' | '?' => Self::SentenceEnd,
            ':' | ';' | ',' => Self::SoftBreak,
            ch if ch.is_whitespace() => Self::SoftBreak,
            _ => Self::CharacterLimit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParagraphEnd => "paragraph_end",
            Self::SentenceEnd => "sentence_end",
            Self::SoftBreak => "soft_break",
            Self::CharacterLimit => "character_limit",
        }
    }
}

/// One paragraph together with the end offsets of its chunks.
///
/// Immutable once built. Chunk `i` spans `[chunk_start(i), chunk_end(i))` in
/// byte offsets; the spans tile the whole paragraph.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParagraphChunks {
    paragraph_index: usize,
    text: String,
    end_offsets: Vec<usize>,
}

impl ParagraphChunks {
    pub fn new(paragraph_index: usize, text: impl Into<String>, max_length: usize) -> Self {
        let text = text.into();
        let end_offsets = compute_end_offsets(&text, max_length);
        Self {
            paragraph_index,
            text,
            end_offsets,
        }
    }

    /// Whole paragraph as a single chunk (full-paragraph reading mode).
    pub fn whole(paragraph_index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let end_offsets = if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text.len()]
        };
        Self {
            paragraph_index,
            text,
            end_offsets,
        }
    }

    pub fn with_config(
        paragraph_index: usize,
        text: impl Into<String>,
        config: &PaginationConfig,
    ) -> Self {
        if config.full_paragraph_mode {
            Self::whole(paragraph_index, text)
        } else {
            Self::new(paragraph_index, text, config.effective_chunk_length())
        }
    }

    pub fn paragraph_index(&self) -> usize {
        self.paragraph_index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn end_offsets(&self) -> &[usize] {
        &self.end_offsets
    }

    pub fn count(&self) -> usize {
        self.end_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_offsets.is_empty()
    }

    /// Index of the last chunk, `0` for an empty paragraph.
    pub fn last_index(&self) -> usize {
        self.count().saturating_sub(1)
    }

    /// Chunk text with surrounding whitespace trimmed.
    pub fn chunk(&self, index: usize) -> Option<&str> {
        let start = self.chunk_start(index)?;
        let end = self.chunk_end(index)?;
        Some(self.text[start..end].trim())
    }

    pub fn chunk_start(&self, index: usize) -> Option<usize> {
        if index >= self.count() {
            return None;
        }
        if index == 0 {
            Some(0)
        } else {
            Some(self.end_offsets[index - 1])
        }
    }

    pub fn chunk_end(&self, index: usize) -> Option<usize> {
        self.end_offsets.get(index).copied()
    }

    /// Chunk containing byte `offset`, the inverse of [`Self::chunk_start`].
    ///
    /// `None` when the offset is past the paragraph, for example because it
    /// was saved against a longer text.
    pub fn find_chunk_for_offset(&self, offset: usize) -> Option<usize> {
        if offset >= self.text.len() || self.is_empty() {
            return None;
        }

        let index = self.end_offsets.partition_point(|&end| end <= offset);
        Some(index.min(self.last_index()))
    }

    pub fn end_type(&self, index: usize) -> Option<ChunkEndType> {
        let end = self.chunk_end(index)?;
        if index == self.last_index() {
            return Some(ChunkEndType::ParagraphEnd);
        }

        self.text[..end]
            .chars()
            .next_back()
            .map(ChunkEndType::from_last_char)
    }

    /// Iterates over the trimmed chunk texts in order.
    pub fn chunks(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.count()).filter_map(|index| self.chunk(index))
    }
}
