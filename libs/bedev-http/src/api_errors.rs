//! Structured API errors
//!
//! The API family reports failures in two body formats:
//!
//! - BEDEV1: `{"errors": [{"code": 0, "message": "...", "userFacingMessage": "...", "field": "..."}]}`
//! - BEDEV2: `{"code": 3, "message": "...", "details": [...]}`
//!
//! Parsers turn a failed response into [`ErrorRecord`]s; [`render_error_message`]
//! formats them for [`RestError`](crate::RestError).

use crate::transport::TransportResponse;
use serde::Deserialize;
use serde_json::Value;

/// Longest plain-text body kept as an error message
const MAX_TEXT_MESSAGE: usize = 8 * 1024;

/// How failed responses are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    /// Never raise; failed responses are returned like successful ones
    None,
    /// Raise, parsing the body as BEDEV1 errors
    #[default]
    Bedev1,
    /// Raise, parsing the body as BEDEV2 errors
    Bedev2,
}

/// One structured error reported by the API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorRecord {
    pub code: Option<String>,
    pub message: Option<String>,
    pub user_facing_message: Option<String>,
    pub field: Option<String>,
    pub hint: Option<String>,
    /// BEDEV2 `details` entries, verbatim
    pub details: Vec<Value>,
}

impl ErrorRecord {
    /// Record carrying only a message
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Rendered `key: "value"` lines in fixed field order
    fn render_lines(&self) -> Vec<String> {
        [
            ("code", &self.code),
            ("message", &self.message),
            ("userFacingMessage", &self.user_facing_message),
            ("field", &self.field),
            ("hint", &self.hint),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|v| format!("{key}: {}", Value::String(v.clone())))
        })
        .collect()
    }
}

/// Turns a failed response into error records
pub trait ErrorParser: Send + Sync {
    fn parse(&self, response: &TransportResponse) -> Vec<ErrorRecord>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBedev1Error {
    code: Option<Value>,
    message: Option<Value>,
    user_facing_message: Option<Value>,
    field: Option<Value>,
    hint: Option<Value>,
}

impl From<RawBedev1Error> for ErrorRecord {
    fn from(raw: RawBedev1Error) -> Self {
        Self {
            code: raw.code.and_then(value_text),
            message: raw.message.and_then(value_text),
            user_facing_message: raw.user_facing_message.and_then(value_text),
            field: raw.field.and_then(value_text),
            hint: raw.hint.and_then(value_text),
            details: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBedev1Body {
    errors: Vec<RawBedev1Error>,
}

/// BEDEV1 parser
///
/// Falls back to a top-level `message` field, then to the (truncated) plain-text body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bedev1ErrorParser;

impl ErrorParser for Bedev1ErrorParser {
    fn parse(&self, response: &TransportResponse) -> Vec<ErrorRecord> {
        if let Ok(body) = serde_json::from_slice::<RawBedev1Body>(&response.body) {
            return body.errors.into_iter().map(ErrorRecord::from).collect();
        }
        if let Ok(single) = serde_json::from_slice::<RawBedev1Error>(&response.body)
            && single.message.is_some()
        {
            return vec![single.into()];
        }
        text_fallback(response)
    }
}

#[derive(Debug, Deserialize)]
struct RawBedev2Body {
    code: Option<Value>,
    message: Option<Value>,
    #[serde(default)]
    details: Vec<Value>,
}

/// BEDEV2 parser: a single `{code, message, details}` object
#[derive(Debug, Clone, Copy, Default)]
pub struct Bedev2ErrorParser;

impl ErrorParser for Bedev2ErrorParser {
    fn parse(&self, response: &TransportResponse) -> Vec<ErrorRecord> {
        match serde_json::from_slice::<RawBedev2Body>(&response.body) {
            Ok(body) if body.code.is_some() || body.message.is_some() => vec![ErrorRecord {
                code: body.code.and_then(value_text),
                message: body.message.and_then(value_text),
                details: body.details,
                ..ErrorRecord::default()
            }],
            _ => text_fallback(response),
        }
    }
}

/// Non-JSON bodies become a single message record, unless empty
fn text_fallback(response: &TransportResponse) -> Vec<ErrorRecord> {
    let text = response.text();
    let text = text.trim();
    if text.is_empty() || text.starts_with('{') || text.starts_with('[') {
        return Vec::new();
    }
    let mut end = text.len().min(MAX_TEXT_MESSAGE);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    vec![ErrorRecord::from_message(&text[..end])]
}

/// Scalar JSON value as text; `null` is absent
fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Human-readable block for a list of records
///
/// Each record renders as `key: "value"` lines; records are separated by a blank
/// line. Without records the message is `"{code} {status text}"`.
#[must_use]
pub fn render_error_message(records: &[ErrorRecord], code: u16, status_text: &str) -> String {
    let blocks: Vec<String> = records
        .iter()
        .map(|record| record.render_lines().join("\n"))
        .filter(|block| !block.is_empty())
        .collect();

    if blocks.is_empty() {
        return format!("{code} {status_text}").trim_end().to_owned();
    }
    blocks.join("\n\n")
}
