//! Recovery of JSON arrays from possibly-truncated LLM responses.
//!
//! Models routinely hit their output-token limit mid-array. Rather than
//! discarding the whole response, the salvager strips a leading Markdown
//! code fence, attempts a strict parse of the outermost array, and on
//! failure scans bracket-aware (respecting string literals and escapes)
//! for the longest prefix of complete elements.

use serde_json::Value as Json;

/// Parse a JSON array out of raw model output.
///
/// Returns the array's elements. For valid input this equals a strict
/// parse; for a truncated array of objects it returns some prefix of the
/// original objects — never a partially-written one. Returns an empty vec
/// when no element completes (including when no `[` is present at all).
pub fn parse_array(text: &str) -> Vec<Json> {
    let stripped = strip_code_fence(text);
    let Some(start) = stripped.find('[') else {
        return Vec::new();
    };
    let body = &stripped[start..];

    // Strict path first: outermost `[` .. last `]`.
    if let Some(end) = body.rfind(']') {
        if let Ok(Json::Array(items)) = serde_json::from_str::<Json>(&body[..=end]) {
            return items;
        }
    }

    salvage_prefix(body)
}

/// Strip one leading Markdown code fence (```json, ```JSON, or bare ```)
/// and its closing fence if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. "json") up to the end of the fence line.
    let body = match after_open.find('\n') {
        Some(pos) => &after_open[pos + 1..],
        None => return trimmed,
    };
    let body = body.trim_end();
    body.strip_suffix("```").map_or(body, str::trim_end)
}

/// Bracket-aware scan: find the last index at which an element directly
/// inside the outer array completes, close the array there, and re-parse
/// strictly.
fn salvage_prefix(body: &str) -> Vec<Json> {
    debug_assert!(body.starts_with('['));

    let bytes = body.as_bytes();
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    // Byte offset just past the most recent completed array element.
    let mut last_complete: Option<usize> = None;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                if depth == 0 {
                    // Stray closer outside any structure — stop scanning.
                    break;
                }
                depth -= 1;
                if depth == 1 {
                    // An object or nested array directly inside the outer
                    // array just closed.
                    last_complete = Some(i + 1);
                }
                if depth == 0 {
                    // Outer array closed; the strict path already failed on
                    // everything up to here, so stop.
                    break;
                }
            }
            _ => {}
        }
    }

    let Some(end) = last_complete else {
        return Vec::new();
    };

    let candidate = format!("{}]", &body[..end]);
    match serde_json::from_str::<Json>(&candidate) {
        Ok(Json::Array(items)) => items,
        _ => Vec::new(),
    }
}
