//! Bounded chunk splitting with priority-based break selection.
//!
//! A paragraph is cut at natural sentence ends first. Sentences longer than
//! the reading pane are shortened at the best soft break found in the back
//! half of the allowed span, trying `:` then `;` then `,` then a space, and
//! only hard-cut when none of those is usable.
//!
//! Lengths are counted in characters while the emitted end offsets are byte
//! offsets into the paragraph, always on `char` boundaries.

use log::trace;

use crate::settings::clamp_chunk_length;

/// Sentinel paragraph the extraction pipeline uses for section boundaries.
pub const SECTION_BREAK_MARKER: &str = "[BREAK]";

const SENTENCE_TERMINATORS: [char; 3] = ['.', '!', '?'];
/// Soft break candidates, highest priority first.
const BREAK_PRIORITY: [char; 4] = [':', ';', ',', ' '];

/// Computes the end offsets that partition `paragraph` into chunks of at most
/// `max_length` characters.
///
/// The result is strictly increasing and its last element equals
/// `paragraph.len()`. It is empty iff the paragraph is empty or only
/// whitespace. `max_length` below [`crate::settings::MIN_CHUNK_LENGTH`] is
/// raised to it.
pub fn compute_end_offsets(paragraph: &str, max_length: usize) -> Vec<usize> {
    let trimmed = paragraph.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed == SECTION_BREAK_MARKER {
        return vec![paragraph.len()];
    }

    let max_length = clamp_chunk_length(max_length);
    let scanner = CharScanner::new(paragraph);
    let len = scanner.len();
    let mut offsets = Vec::new();
    let mut start = 0usize;

    while start < len {
        start = scanner.skip_whitespace(start);
        if start >= len {
            break;
        }

        let boundary = scanner.next_sentence_end(start);
        let end = if boundary - start <= max_length {
            boundary
        } else {
            scanner.shorten(start, boundary, max_length)
        };

        offsets.push(scanner.byte_offset(end));
        start = end;
    }

    // Trailing whitespace belongs to the last chunk.
    if let Some(last) = offsets.last_mut() {
        *last = paragraph.len();
    }

    trace!(
        "splitter: done chars={} max_length={} chunks={}",
        len,
        max_length,
        offsets.len()
    );
    offsets
}

struct CharScanner {
    chars: Vec<char>,
    byte_offsets: Vec<usize>,
    text_len: usize,
}

impl CharScanner {
    fn new(text: &str) -> Self {
        let (byte_offsets, chars) = text.char_indices().unzip();
        Self {
            chars,
            byte_offsets,
            text_len: text.len(),
        }
    }

    fn len(&self) -> usize {
        self.chars.len()
    }

    fn byte_offset(&self, position: usize) -> usize {
        self.byte_offsets
            .get(position)
            .copied()
            .unwrap_or(self.text_len)
    }

    fn skip_whitespace(&self, mut position: usize) -> usize {
        while position < self.len() && self.chars[position].is_whitespace() {
            position += 1;
        }
        position
    }

    /// Position just past the next valid sentence end, or the paragraph end.
    fn next_sentence_end(&self, start: usize) -> usize {
        (start..self.len())
            .find(|&position| {
                SENTENCE_TERMINATORS.contains(&self.chars[position])
                    && self.followed_by_whitespace_or_end(position)
            })
            .map_or(self.len(), |position| position + 1)
    }

    fn followed_by_whitespace_or_end(&self, position: usize) -> bool {
        self.chars
            .get(position + 1)
            .is_none_or(|next| next.is_whitespace())
    }

    /// Picks the end of an over-long span starting at `start`.
    fn shorten(&self, start: usize, boundary: usize, max_length: usize) -> usize {
        let limit = (start + max_length).min(boundary);
        let floor = start + max_length / 2;

        for candidate in BREAK_PRIORITY {
            // The chunk ends after the break character, so `limit - 1` is the
            // last position that keeps the chunk within `max_length`.
            let found = (floor..limit).rev().find(|&position| {
                self.chars[position] == candidate && self.is_valid_break(position)
            });
            if let Some(position) = found {
                trace!(
                    "splitter: soft break start={} char={:?} end={}",
                    start,
                    candidate,
                    position + 1
                );
                return position + 1;
            }
        }

        trace!("splitter: hard cut start={} end={}", start, limit);
        limit
    }

    fn is_valid_break(&self, position: usize) -> bool {
        let Some(next) = self.chars.get(position + 1) else {
            return true;
        };

        if self.chars[position] == ' ' {
            // Never split inside a run of spaces.
            !next.is_whitespace()
        } else {
            next.is_whitespace()
        }
    }
}
