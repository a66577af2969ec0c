//! `@name` mention extraction and highlighting.

use once_cell::sync::Lazy;
use regex::Regex;

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("valid mention pattern"));

/// Names referenced as `@name` in `text`, in order of first appearance.
///
/// Repeated mentions are kept; the server receives exactly what was typed.
pub fn extract_mentions(text: &str) -> Vec<String> {
    MENTION
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// A run of message text, either plain or a mention (without the `@`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Mention(&'a str),
}

/// Split `text` into plain and mention segments for rendering.
pub fn highlight_mentions(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in MENTION.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(Segment::Text(&text[cursor..whole.start()]));
        }
        segments.push(Segment::Mention(name.as_str()));
        cursor = whole.end();
    }

    if cursor < text.len() {
        segments.push(Segment::Text(&text[cursor..]));
    }
    segments
}
