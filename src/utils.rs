//! Text normalization helpers shared by the fetch and report stages.

use std::borrow::Cow;

use crate::constants::fetch::{CONSOLE_TAIL_LINES, FAILURE_MARKERS, STACK_FRAME_PREFIX};
use crate::types::Excerpt;

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_inline_whitespace<T: AsRef<str>>(text: T) -> String {
    let mut normalized = String::new();
    let mut seen_space = false;
    for ch in text.as_ref().chars() {
        if ch.is_whitespace() {
            if !seen_space {
                normalized.push(' ');
                seen_space = true;
            }
        } else {
            normalized.push(ch);
            seen_space = false;
        }
    }
    normalized.trim().to_string()
}

/// Cut `text` to at most `max_chars` chars, never splitting a char.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Trim, collapse whitespace, and cap the excerpt length.
///
/// Returns `None` when nothing is left, so callers can drop the entry.
pub fn normalize_excerpt(text: &str, max_chars: usize) -> Option<Excerpt> {
    let collapsed = normalize_inline_whitespace(text);
    let capped = truncate_chars(&collapsed, max_chars).trim_end();
    if capped.is_empty() {
        None
    } else {
        Some(capped.to_string())
    }
}

/// True when a console line carries failure evidence.
pub fn is_failure_line(line: &str) -> bool {
    if line.trim_start().starts_with(STACK_FRAME_PREFIX) {
        return true;
    }
    FAILURE_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Keep only failure lines of a console log, or its tail when none match.
pub fn extract_failure_lines(console: &str) -> String {
    let failure_lines: Vec<&str> = console.lines().filter(|line| is_failure_line(line)).collect();
    if !failure_lines.is_empty() {
        return failure_lines.join("\n");
    }
    let lines: Vec<&str> = console
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(CONSOLE_TAIL_LINES);
    lines[start..].join("\n")
}

/// Decode `\n`, `\t`, `\r` and `\\` escapes in a tab-separated field.
///
/// Unknown escapes are kept verbatim.
pub fn unescape_field(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            decoded.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('r') => decoded.push('\r'),
            Some('\\') => decoded.push('\\'),
            Some(other) => {
                decoded.push('\\');
                decoded.push(other);
            }
            None => decoded.push('\\'),
        }
    }
    decoded
}

/// Decode a response body one line at a time, replacing invalid UTF-8 per line.
///
/// Also returns the 1-based numbers of the lines that needed replacement.
pub fn decode_lines_lossy(bytes: &[u8]) -> (String, Vec<usize>) {
    let mut text = String::with_capacity(bytes.len());
    let mut repaired = Vec::new();
    for (idx, line) in bytes.split(|byte| *byte == b'\n').enumerate() {
        if idx > 0 {
            text.push('\n');
        }
        match String::from_utf8_lossy(line) {
            Cow::Borrowed(valid) => text.push_str(valid),
            Cow::Owned(replaced) => {
                repaired.push(idx + 1);
                text.push_str(&replaced);
            }
        }
    }
    (text, repaired)
}

/// Shorten a signature for display, marking the cut with an ellipsis.
pub fn display_signature(signature: &str, max_chars: usize) -> String {
    let first_line = signature.lines().next().unwrap_or_default().trim();
    let shown = truncate_chars(first_line, max_chars);
    if shown.len() < signature.trim().len() {
        format!("{shown}…")
    } else {
        shown.to_string()
    }
}
