//! Reader-tunable pagination settings and the resumable reading position.

/// Default reading-pane capacity in characters.
pub const DEFAULT_CHUNK_LENGTH: usize = 150;
/// Smallest chunk length the splitter honors; smaller requests are raised.
pub const MIN_CHUNK_LENGTH: usize = 8;

const DEFAULT_WORKER_NAME: &str = "bookbits-buffer";

/// Reading location persisted by the consumer to resume a book.
///
/// `char_offset` is a byte offset into the paragraph text. It stays meaningful
/// when the chunk length changes, unlike a chunk index.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ReadingPosition {
    pub paragraph_index: usize,
    pub char_offset: usize,
}

impl ReadingPosition {
    pub const fn new(paragraph_index: usize, char_offset: usize) -> Self {
        Self {
            paragraph_index,
            char_offset,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PaginationConfig {
    pub max_chunk_length: usize,
    /// Show each paragraph as a single chunk instead of splitting it.
    pub full_paragraph_mode: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: DEFAULT_CHUNK_LENGTH,
            full_paragraph_mode: false,
        }
    }
}

impl PaginationConfig {
    pub const fn new(max_chunk_length: usize) -> Self {
        Self {
            max_chunk_length: clamp_chunk_length(max_chunk_length),
            full_paragraph_mode: false,
        }
    }

    pub const fn with_max_chunk_length(mut self, max_chunk_length: usize) -> Self {
        self.max_chunk_length = clamp_chunk_length(max_chunk_length);
        self
    }

    pub const fn with_full_paragraph_mode(mut self, enabled: bool) -> Self {
        self.full_paragraph_mode = enabled;
        self
    }

    /// Chunk length actually used by the splitter.
    pub const fn effective_chunk_length(&self) -> usize {
        clamp_chunk_length(self.max_chunk_length)
    }
}

pub const fn clamp_chunk_length(max_chunk_length: usize) -> usize {
    if max_chunk_length < MIN_CHUNK_LENGTH {
        MIN_CHUNK_LENGTH
    } else {
        max_chunk_length
    }
}

/// Construction-time options for a [`crate::buffer::BufferManager`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BufferConfig {
    pub pagination: PaginationConfig,
    pub worker_name: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            pagination: PaginationConfig::default(),
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl BufferConfig {
    pub fn with_pagination(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_worker_name(mut self, worker_name: impl Into<String>) -> Self {
        self.worker_name = worker_name.into();
        self
    }
}
