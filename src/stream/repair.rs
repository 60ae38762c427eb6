//! Best-effort decoding of truncated JSON.

use serde_json::{Deserializer, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opener {
    Object,
    Array,
    String,
}

#[derive(Debug, Default)]
struct Scan {
    open: Vec<Opener>,
    /// Byte offset of the last `,` outside any string.
    last_comma: Option<usize>,
    /// Byte offset just past the last `{`/`[` outside any string.
    after_last_open: Option<usize>,
}

fn scan(text: &str) -> Scan {
    let mut state = Scan::default();
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if state.open.last() == Some(&Opener::String) {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                state.open.pop();
            }
            continue;
        }

        match ch {
            '"' => state.open.push(Opener::String),
            '{' => {
                state.open.push(Opener::Object);
                state.after_last_open = Some(offset + 1);
            }
            '[' => {
                state.open.push(Opener::Array);
                state.after_last_open = Some(offset + 1);
            }
            '}' if state.open.last() == Some(&Opener::Object) => {
                state.open.pop();
            }
            ']' if state.open.last() == Some(&Opener::Array) => {
                state.open.pop();
            }
            ',' => state.last_comma = Some(offset),
            _ => {}
        }
    }

    state
}

fn close_and_parse(text: &str, scanned: &Scan) -> Option<Value> {
    let mut candidate = String::with_capacity(text.len() + scanned.open.len());
    candidate.push_str(text);
    for opener in scanned.open.iter().rev() {
        candidate.push(match opener {
            Opener::Object => '}',
            Opener::Array => ']',
            Opener::String => '"',
        });
    }
    serde_json::from_str(&candidate).ok()
}

/// Removes Markdown code fences and chatter before the first container.
pub fn strip_wrappers(input: &str) -> &str {
    let mut text = input.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|ch: char| ch.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    let text = text.trim();
    match text.find(['{', '[']) {
        Some(start) => &text[start..],
        None => text,
    }
}

/// Decodes `buffer` after closing every container and string left open.
///
/// Returns `None` when nothing usable can be recovered yet; never panics.
/// When the naive close fails (dangling key, comma or literal), the text is
/// cut back to the last member separator, then to the last opener.
pub fn repair_json(buffer: &str) -> Option<Value> {
    let text = strip_wrappers(buffer);
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let scanned = scan(text);
    if let Some(value) = close_and_parse(text, &scanned) {
        return Some(value);
    }

    let cuts = [scanned.last_comma, scanned.after_last_open];
    cuts.into_iter().flatten().find_map(|cut| {
        let prefix = &text[..cut];
        close_and_parse(prefix, &scan(prefix))
    })
}

/// Splits back-to-back complete values off the front of `buffer`.
///
/// Returns the decoded values and the unconsumed remainder, which starts at
/// the first incomplete value. Garbage between values is skipped up to the
/// next opener.
pub fn extract_values(buffer: &str) -> (Vec<Value>, String) {
    let mut values = Vec::new();
    let mut rest = buffer;

    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            return (values, String::new());
        }

        let mut stream = Deserializer::from_str(trimmed).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                let consumed = stream.byte_offset();
                values.push(value);
                rest = &trimmed[consumed..];
            }
            Some(Err(error)) if error.is_eof() => return (values, trimmed.to_string()),
            Some(Err(_)) => {
                let skip_from = trimmed.char_indices().nth(1).map_or(trimmed.len(), |(i, _)| i);
                match trimmed[skip_from..].find(['{', '[']) {
                    Some(next) => rest = &trimmed[skip_from + next..],
                    None => return (values, String::new()),
                }
            }
            None => return (values, String::new()),
        }
    }
}
