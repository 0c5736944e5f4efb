use crate::api_errors::ErrorRecord;
use crate::rate_limit::RateLimitSnapshot;
use crate::response::RestResponse;
use std::fmt;
use thiserror::Error;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUrlKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
}

/// Client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Single transport attempt timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// JSON encoding or decoding error
    #[error("JSON processing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Form URL decoding error
    #[error("Form decoding failed: {0}")]
    FormDecode(#[from] serde_urlencoded::de::Error),

    /// Invalid target URL
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        kind: InvalidUrlKind,
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },

    /// The request signer failed to produce headers
    #[error("Request signing failed: {0}")]
    Signer(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The caller's challenge handler failed
    #[error("Challenge handler failed: {0}")]
    ChallengeHandler(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Terminal non-2xx response from the API
    #[error("{0}")]
    Rest(Box<RestError>),
}

impl HttpError {
    /// The terminal API error, if this is one
    #[must_use]
    pub fn as_rest(&self) -> Option<&RestError> {
        match self {
            HttpError::Rest(rest) => Some(rest),
            _ => None,
        }
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

/// Terminal API error raised once retries are exhausted or not applicable
///
/// Carries the rendered multi-line message, the structured error records parsed
/// from the body, the HTTP status code, the full response and the rate-limit
/// snapshot observed on it.
#[derive(Debug)]
pub struct RestError {
    pub message: String,
    pub errors: Vec<ErrorRecord>,
    pub code: u16,
    pub response: RestResponse,
    pub rate_limit: Option<RateLimitSnapshot>,
}

impl fmt::Display for RestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
