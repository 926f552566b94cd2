//! Text shaping and truncation for log lines and compact status surfaces.

use core::fmt::Write;

use heapless::String as HeaplessString;

pub const COMPACT_MAX_WORDS: usize = 7;
pub const COMPACT_MAX_CHARS: usize = 34;
pub const PREVIEW_CAPACITY: usize = 160;
pub const PROGRESS_CAPACITY: usize = 48;

pub type Preview = HeaplessString<PREVIEW_CAPACITY>;
pub type ProgressLabel = HeaplessString<PROGRESS_CAPACITY>;

pub fn preview_compact(source: &str) -> Preview {
    preview_limited(source, COMPACT_MAX_WORDS, COMPACT_MAX_CHARS)
}

/// First words of `source`, single-spaced, with `...` when anything was cut.
pub fn preview_limited(source: &str, max_words: usize, max_chars: usize) -> Preview {
    let mut out = Preview::new();
    let mut char_count = 0usize;
    let mut truncated = false;

    'words: for (word_count, word) in source.split_whitespace().enumerate() {
        if word_count >= max_words {
            truncated = true;
            break;
        }

        if word_count > 0 {
            if char_count >= max_chars || out.push(' ').is_err() {
                truncated = true;
                break;
            }
            char_count += 1;
        }

        for ch in word.chars() {
            if char_count >= max_chars || out.push(ch).is_err() {
                truncated = true;
                break 'words;
            }
            char_count += 1;
        }
    }

    if truncated && !out.is_empty() {
        let _ = out.push_str("...");
    }
    out
}

/// `"p <paragraph>/<total> c <chunk>/<chunks>"`, one-based for display.
pub fn progress_label(
    paragraph_index: usize,
    total_paragraphs: usize,
    chunk_index: usize,
    chunk_count: usize,
) -> ProgressLabel {
    let mut label = ProgressLabel::new();
    let _ = write!(
        label,
        "p {}/{} c {}/{}",
        paragraph_index + 1,
        total_paragraphs,
        (chunk_index + 1).min(chunk_count.max(1)),
        chunk_count
    );
    label
}

/// Whole-book percentage from the paragraph position, `0..=100`.
pub fn percent_read(paragraph_index: usize, total_paragraphs: usize) -> u8 {
    if total_paragraphs == 0 {
        return 100;
    }
    let read = (paragraph_index + 1).min(total_paragraphs) as u64 * 100;
    (read / total_paragraphs as u64) as u8
}
