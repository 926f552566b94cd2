//! Text pagination engine for the BookBits reader.
//!
//! Raw prose is carved into paragraphs ([`text::segmenter`]), each paragraph
//! into bounded reading chunks ([`text::splitter`]), and a three-paragraph
//! window over a [`store::ParagraphStore`] is kept resident by
//! [`buffer::BufferManager`].

pub mod buffer;
pub mod settings;
pub mod store;
pub mod text;
pub mod text_policy;
