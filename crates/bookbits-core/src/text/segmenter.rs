//! Splits extracted prose into paragraphs at blank-line boundaries.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;

// Any whitespace run that contains at least two newlines.
static BLANK_LINE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n\s*\n\s*").expect("valid blank-line pattern"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Splits `text` into normalized paragraphs, one per blank-line-delimited block.
///
/// Each paragraph is a single line: embedded newlines and whitespace runs are
/// collapsed to one space and the result is trimmed. Blocks that end up empty
/// are dropped, so empty or all-whitespace input yields no paragraphs.
pub fn segment(text: &str) -> Vec<String> {
    let paragraphs: Vec<String> = BLANK_LINE_BOUNDARY
        .split(text)
        .map(normalize_paragraph)
        .filter(|paragraph| !paragraph.is_empty())
        .collect();

    debug!(
        "segment: done input_bytes={} paragraphs={}",
        text.len(),
        paragraphs.len()
    );
    paragraphs
}

/// Collapses every whitespace run in `block` to a single space and trims it.
pub fn normalize_paragraph(block: &str) -> String {
    WHITESPACE_RUN.replace_all(block.trim(), " ").into_owned()
}
