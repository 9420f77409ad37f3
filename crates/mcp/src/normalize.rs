//! Search tool output normalization.
//!
//! Each text block is either a JSON document with a `results` array or free-form text. Both
//! shapes become one evidence line; JSON without results contributes nothing. A document whose
//! first hit cannot be read as text (a `null` document or hit, a non-string title or snippet) is
//! kept as raw text.

use serde_json::Value;

pub const DEFAULT_TITLE: &str = "Evidence found";
pub const DEFAULT_SNIPPET: &str = "No text";

const TITLE_LOG_CHARS: usize = 40;
const SNIPPET_CHARS: usize = 150;
const RAW_CHARS: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchPayload {
    Structured(SearchHit),
    Raw(String),
    NoResults,
}

impl SearchPayload {
    pub fn parse(text: &str) -> Self {
        let raw = || Self::Raw(text.to_string());
        let document = match serde_json::from_str::<Value>(text) {
            Ok(Value::Null) | Err(_) => return raw(),
            Ok(document) => document,
        };

        match document.get("results").and_then(Value::as_array).and_then(|results| results.first())
        {
            None => Self::NoResults,
            Some(Value::Null) => raw(),
            Some(first) => {
                let title = text_field(first, "title", DEFAULT_TITLE);
                let snippet = text_field(first, "text", DEFAULT_SNIPPET);
                match title.zip(snippet) {
                    Some((title, snippet)) => Self::Structured(SearchHit {
                        title: title.to_string(),
                        snippet: snippet.to_string(),
                    }),
                    None => raw(),
                }
            }
        }
    }

    /// Evidence line for this payload, if it produces one.
    pub fn evidence(&self) -> Option<String> {
        match self {
            Self::Structured(hit) => {
                Some(format!("- {}: {}...", hit.title, truncate_chars(&hit.snippet, SNIPPET_CHARS)))
            }
            Self::Raw(text) => Some(format!("- {}...", truncate_chars(text, RAW_CHARS))),
            Self::NoResults => None,
        }
    }

    /// Progress line announcing a structured hit.
    pub fn found_line(&self) -> Option<String> {
        match self {
            Self::Structured(hit) => {
                Some(format!("📄 Found: {}...", truncate_chars(&hit.title, TITLE_LOG_CHARS)))
            }
            Self::Raw(_) | Self::NoResults => None,
        }
    }
}

/// Field text, `default` when the field is missing or falsy, `None` when it holds anything
/// other than a string.
fn text_field<'a>(value: &'a Value, key: &str, default: &'a str) -> Option<&'a str> {
    match value.get(key) {
        None => Some(default),
        Some(field) if is_falsy(field) => Some(default),
        Some(Value::String(text)) => Some(text),
        Some(_) => None,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Prefix of at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
