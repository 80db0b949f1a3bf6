//! Locating the message text inside a chat-completion response body
//!
//! Providers disagree on where the text lives. Each extractor knows one
//! shape; they are tried in order and the first hit wins.

use serde_json::Value;

/// A named response-shape extractor
pub struct Extractor {
    pub name: &'static str,
    pub extract: fn(&Value) -> Option<String>,
}

/// Extractors in priority order
pub const EXTRACTORS: &[Extractor] = &[
    Extractor {
        name: "choices[0].message.content",
        extract: openai_choice,
    },
    Extractor {
        name: "response",
        extract: response_field,
    },
    Extractor {
        name: "text",
        extract: text_field,
    },
    Extractor {
        name: "content",
        extract: content_field,
    },
    Extractor {
        name: "raw",
        extract: raw_string,
    },
];

/// Find the message text, returning it with the name of the extractor that matched
pub fn extract_content(body: &Value) -> Option<(&'static str, String)> {
    EXTRACTORS
        .iter()
        .find_map(|extractor| (extractor.extract)(body).map(|text| (extractor.name, text)))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn openai_choice(body: &Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .and_then(non_empty)
}

fn string_field(body: &Value, field: &str) -> Option<String> {
    body.get(field)?.as_str().and_then(non_empty)
}

fn response_field(body: &Value) -> Option<String> {
    string_field(body, "response")
}

fn text_field(body: &Value) -> Option<String> {
    string_field(body, "text")
}

fn content_field(body: &Value) -> Option<String> {
    string_field(body, "content")
}

fn raw_string(body: &Value) -> Option<String> {
    body.as_str().and_then(non_empty)
}
