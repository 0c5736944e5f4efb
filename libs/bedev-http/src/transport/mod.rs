//! Transport seam
//!
//! The orchestrator never talks to the network directly: it hands a
//! [`TransportRequest`] to a [`Transport`] and receives a fully buffered
//! [`TransportResponse`]. Buffering once lets the body be read twice (error
//! and challenge parsing, then final decoding) through cheap `Bytes` clones.

mod hyper_transport;
mod tls;

pub use hyper_transport::{HyperTransport, HyperTransportBuilder};

use crate::error::HttpError;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// Credentials mode requested from the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    /// Send cookies and authorization headers
    Include,
    /// Strip cookies and authorization headers
    Omit,
}

impl Credentials {
    /// Explicit caller flag to mode. `None` leaves the transport default.
    #[must_use]
    pub fn from_flag(flag: Option<bool>) -> Option<Self> {
        flag.map(|include| if include { Self::Include } else { Self::Omit })
    }
}

/// Cache hint forwarded to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

/// A single outbound request, ready for the wire
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub cache: Option<CacheMode>,
    pub body: Option<Bytes>,
    pub credentials: Option<Credentials>,
}

/// A buffered response as returned by a [`Transport`]
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    /// Final URL after redirects
    pub url: String,
    pub redirected: bool,
    pub body: Bytes,
}

impl TransportResponse {
    /// Build a response with the canonical status text, no headers and no redirect
    #[must_use]
    pub fn new(status: StatusCode, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: HeaderMap::new(),
            url: url.into(),
            redirected: false,
            body: body.into(),
        }
    }

    /// Status is in the 2xx range
    #[must_use]
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Declared `Content-Length`, falling back to the buffered body size
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(self.body.len())
    }

    /// Body as UTF-8 text; invalid sequences are replaced
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Value of a header as a string, if present and valid
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Fetch-like network transport
///
/// Implementations execute exactly one request; redirects, decompression and
/// timeouts are theirs to handle. Non-2xx statuses are returned as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute the request and buffer the response.
    ///
    /// # Errors
    /// Returns `HttpError` for network, TLS, timeout and body-size failures.
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse, HttpError>;
}
