//! Chunking of statement text at date-record boundaries.
//!
//! OCR and PDF text extraction wrap one transaction across several visual
//! lines, so a **line merge** runs first: lines that do not begin with a
//! date pattern are folded onto the previous non-empty line. The splitter
//! then cuts near the target size, preferring cut points that coincide
//! with the start of a date-prefixed line so no transaction straddles two
//! chunks.

use std::sync::OnceLock;

use regex::Regex;

/// How far past the target the splitter may look for a date boundary.
pub const BOUNDARY_SLACK: usize = 500;

/// A date boundary is only accepted at or after this fraction of the
/// target, keeping chunks from collapsing far below the requested size.
const MIN_CUT_FRACTION: f64 = 0.7;

/// A text fragment whose boundaries align with date-record starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// `YYYY.MM.DD`, `YYYY-MM-DD`, or `YYYY/MM/DD` at the start of a line,
/// with one- or two-digit month and day.
fn date_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\d{4}[.\-/]\d{1,2}[.\-/]\d{1,2}").expect("valid date regex")
    })
}

/// Whether a line opens a new transaction record.
pub fn starts_with_date(line: &str) -> bool {
    date_start_re().is_match(line)
}

/// Fold continuation lines onto their transaction line.
///
/// A line that does not begin with a date is appended to the previous
/// non-empty line with a single space; a line with no predecessor (the
/// statement header, typically) starts its own line. Blank lines vanish.
pub fn merge_lines(text: &str) -> String {
    let mut merged: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if starts_with_date(trimmed) || merged.is_empty() {
            merged.push(trimmed.to_string());
        } else if let Some(last) = merged.last_mut() {
            last.push(' ');
            last.push_str(trimmed);
        }
    }
    merged.join("\n")
}

/// Cut `text` into chunks of roughly `target` characters whose boundaries
/// sit at date-line starts where possible.
///
/// For each window the splitter scans backward from `target + slack` for a
/// date-start boundary no earlier than `0.7 × target`; failing that it
/// cuts at exactly `target`. Chunks are trimmed and empties dropped, so
/// concatenating all chunks reproduces the input up to whitespace.
pub fn split(text: &str, target: usize) -> Vec<Chunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.len() <= target || target == 0 {
        return vec![Chunk {
            index: 0,
            text: trimmed.to_string(),
        }];
    }

    let boundaries = date_line_offsets(trimmed);
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < trimmed.len() {
        let remaining = trimmed.len() - start;
        if remaining <= target + BOUNDARY_SLACK {
            push_chunk(&mut chunks, &trimmed[start..]);
            break;
        }

        let window_end = start + target + BOUNDARY_SLACK;
        let floor = start + ((target as f64) * MIN_CUT_FRACTION) as usize;

        // Latest date-line start inside [floor, window_end].
        let cut = boundaries
            .iter()
            .rev()
            .find(|&&b| b > start && b >= floor && b <= window_end)
            .copied()
            .unwrap_or_else(|| char_floor(trimmed, start + target));

        if cut <= start {
            // Degenerate input (no boundary, target inside a single char):
            // take the rest as one chunk rather than loop forever.
            push_chunk(&mut chunks, &trimmed[start..]);
            break;
        }

        push_chunk(&mut chunks, &trimmed[start..cut]);
        start = cut;
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    chunks.push(Chunk {
        index: chunks.len(),
        text: trimmed.to_string(),
    });
}

/// Byte offsets of every line that starts a date record.
fn date_line_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut pos = 0usize;
    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        if starts_with_date(content) {
            offsets.push(pos);
        }
        pos += line.len();
    }
    offsets
}

/// Largest char boundary at or below `at`.
fn char_floor(text: &str, mut at: usize) -> usize {
    at = at.min(text.len());
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}
