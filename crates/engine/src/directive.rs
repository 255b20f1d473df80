//! Continuation-directive parsing.
//!
//! The think phase ends its output with a control tag:
//!
//! ```text
//! <agent_meta>
//! {"shouldContinue": true, "reason": "need to call the lookup tool"}
//! </agent_meta>
//! ```
//!
//! Because extraction can run on a partial stream buffer, the parser
//! accepts an unterminated tag at end-of-text and recovers truncated JSON
//! fragments. When the tag carries something object-like that cannot be
//! recovered, the policy is **default-continue**: the loop keeps moving
//! rather than getting stuck on a malformed turn.

use serde_json::Value;
use tracing::debug;

const OPEN_TAG: &str = "<agent_meta>";
const CLOSE_TAG: &str = "</agent_meta>";

/// The parsed continue/stop signal from a think turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Whether another action pass is needed
    pub should_continue: bool,

    /// Free-text reason for the decision, when given
    pub reason: Option<String>,
}

impl Directive {
    fn default_continue(reason: Option<String>) -> Self {
        Self {
            should_continue: true,
            reason,
        }
    }
}

/// Extract the continuation directive embedded in `text`.
///
/// Returns `None` when no opening marker is present, or when the tag
/// region carries nothing object-like. Malformed or truncated object
/// content yields a default-continue directive, never an error.
pub fn extract_directive(text: &str) -> Option<Directive> {
    let open = find_marker(text, OPEN_TAG, 0)?;
    let body_start = open + OPEN_TAG.len();
    let body_end = find_marker(text, CLOSE_TAG, body_start).unwrap_or(text.len());
    let body = text[body_start..body_end].trim();
    if body.is_empty() {
        return None;
    }

    let fragment = json_fragment(body)?;
    let parsed = serde_json::from_str::<Value>(fragment)
        .ok()
        .or_else(|| lenient::parse(fragment));

    Some(match parsed {
        Some(value) => directive_from_value(value),
        None => {
            debug!("directive content unrecoverable, defaulting to continue");
            Directive::default_continue(None)
        }
    })
}

/// Remove every control-tag region from `text` and trim the result.
///
/// Both fully closed regions and a still-open region extending to the end
/// of the text are removed. Idempotent.
pub fn strip_directive(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(open) = find_marker(text, OPEN_TAG, pos) {
        out.push_str(&text[pos..open]);
        match find_marker(text, CLOSE_TAG, open + OPEN_TAG.len()) {
            Some(close) => pos = close + CLOSE_TAG.len(),
            None => {
                pos = text.len();
                break;
            }
        }
    }
    out.push_str(&text[pos..]);
    out.trim().to_string()
}

/// Case-insensitive marker search. Markers are ASCII, so byte positions
/// returned here are always valid char boundaries.
fn find_marker(text: &str, marker: &str, from: usize) -> Option<usize> {
    let hay = text.as_bytes();
    let needle = marker.as_bytes();
    if from + needle.len() > hay.len() {
        return None;
    }
    (from..=hay.len() - needle.len())
        .find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Slice the object-like part out of a tag body.
///
/// Takes the first balanced `{...}` region when one exists, or everything
/// from the first `{` onward for a truncated fragment. `None` when the
/// body contains no `{` at all.
fn json_fragment(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let mut depth = 0usize;
    for (i, c) in body[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    Some(&body[start..])
}

/// Interpret a parsed JSON value as a directive.
fn directive_from_value(value: Value) -> Directive {
    let Value::Object(map) = value else {
        debug!("directive content is not an object, defaulting to continue");
        return Directive::default_continue(None);
    };

    for key in map.keys() {
        if key != "shouldContinue" && key != "reason" {
            debug!(field = %key, "ignoring unrecognized directive field");
        }
    }

    let reason = map
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from);

    match map.get("shouldContinue").and_then(Value::as_bool) {
        Some(should_continue) => Directive {
            should_continue,
            reason,
        },
        None => {
            debug!("directive missing a boolean shouldContinue, defaulting to continue");
            Directive::default_continue(reason)
        }
    }
}

/// Recovery for truncated JSON fragments from partial stream buffers.
mod lenient {
    use serde_json::Value;

    /// Try to complete and parse a possibly truncated fragment. When the
    /// completed text still fails to parse, back off past the broken
    /// trailing token and retry.
    pub(super) fn parse(input: &str) -> Option<Value> {
        let mut slice = input;
        loop {
            if let Some(value) = complete_and_parse(slice) {
                return Some(value);
            }
            match last_safe_cut(slice) {
                Some(cut) if cut < slice.len() => slice = &slice[..cut],
                _ => return None,
            }
        }
    }

    /// Close any open string, drop a dangling separator, balance the
    /// bracket stack, then parse.
    fn complete_and_parse(input: &str) -> Option<Value> {
        let mut closers = Vec::new();
        let mut in_string = false;
        let mut escaped = false;

        for c in input.chars() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' => closers.push('}'),
                '[' => closers.push(']'),
                '}' | ']' => {
                    if closers.pop() != Some(c) {
                        return None;
                    }
                }
                _ => {}
            }
        }

        let mut completed = String::from(input);
        if in_string {
            if escaped {
                completed.pop();
            }
            completed.push('"');
        }
        loop {
            let trimmed_len = completed.trim_end().len();
            match completed[..trimmed_len].chars().last() {
                Some(',') => completed.truncate(trimmed_len - 1),
                Some(':') => {
                    completed.truncate(trimmed_len);
                    completed.push_str(" null");
                    break;
                }
                _ => break,
            }
        }
        for closer in closers.iter().rev() {
            completed.push(*closer);
        }

        serde_json::from_str(&completed).ok()
    }

    /// The last position at which the fragment can be cut without
    /// splitting a string: just before the last structural comma, or just
    /// after the first opening brace.
    fn last_safe_cut(input: &str) -> Option<usize> {
        let mut in_string = false;
        let mut escaped = false;
        let mut cut = None;
        for (i, c) in input.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                ',' => cut = Some(i),
                '{' if cut.is_none() => cut = Some(i + 1),
                _ => {}
            }
        }
        cut
    }
}
