//! On-disk paragraph cache for BookBits.
//!
//! Each book lives under `<root>/books/<book_id>/content.txt` with one
//! paragraph per line, and is served through [`FileParagraphStore`].

mod line_store;

pub use line_store::{BOOKS_DIR, CONTENT_FILE, FileParagraphStore, book_id_for_path};
