//! Paragraph segmentation and bounded chunk splitting.

pub mod chunks;
pub mod segmenter;
pub mod splitter;


pub use chunks::{ChunkEndType, ParagraphChunks};
pub use segmenter::{normalize_paragraph, segment};
pub use splitter::{SECTION_BREAK_MARKER, compute_end_offsets};
