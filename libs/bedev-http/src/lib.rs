#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP request client for the BEDEV web API family
//!
//! This crate provides a request pipeline on top of a pluggable [`Transport`]:
//! - URL resolution against the configured main and CDN domains
//! - JSON (big-integer safe), text, file, multipart and url-encoded bodies
//! - Device-override, tracking and signer headers
//! - Automatic CSRF token rotation on `403` responses
//! - Bot-challenge replay through a caller-supplied [`ChallengeHandler`]
//! - Rate-limit header capture
//! - Transient-error retries (500/502/503/504) with optional backoff
//! - Structured BEDEV1 / BEDEV2 error reporting via [`RestError`]
//!
//! The bundled [`HyperTransport`] is hyper-based, HTTPS only by default, follows
//! redirects and decompresses gzip, brotli and deflate bodies.
//!
//! # Example
//!
//! ```ignore
//! use bedev_http::{BedevClient, ErrorHandling};
//!
//! let client = BedevClient::builder().build()?;
//!
//! let user: User = client
//!     .get("users.roblox.com/v1/users/1")
//!     .send()
//!     .await?
//!     .json()?;
//!
//! // CSRF rotation is transparent
//! client
//!     .post("auth.roblox.com/v2/logout")
//!     .credentials(true)
//!     .send()
//!     .await?;
//!
//! // Inspect failures instead of raising
//! let resp = client
//!     .get("apis.roblox.com/v2/maybe")
//!     .error_handling(ErrorHandling::None)
//!     .send()
//!     .await?;
//! ```

mod api_errors;
mod body;
mod builder;
mod challenge;
mod client;
mod config;
mod csrf;
mod dispatch;
mod error;
mod headers;
mod page;
mod rate_limit;
mod request;
mod response;
mod transport;
mod url_builder;

pub use api_errors::{
    Bedev1ErrorParser, Bedev2ErrorParser, ErrorHandling, ErrorParser, ErrorRecord,
    render_error_message,
};
pub use body::{APPLICATION_FORM_URLENCODED, APPLICATION_JSON, EncodedBody, FormPart, RequestBody};
pub use builder::BedevClientBuilder;
pub use challenge::{
    CHALLENGE_ID_HEADER, CHALLENGE_METADATA_HEADER, CHALLENGE_TYPE_HEADER, ChallengeHandler,
    ChallengeParser, ChallengeRecord, HeaderChallengeParser,
};
pub use client::BedevClient;
pub use config::{
    ClientConfig, DEFAULT_ACCOUNT_TOKEN, DEFAULT_CSRF_HEADER, DEFAULT_PROTOCOL, DEFAULT_USER_AGENT,
    Domains, ExponentialBackoff, TlsRootConfig, TransportConfig, TransportSecurity,
};
pub use csrf::CsrfTokenStore;
pub use error::{HttpError, InvalidUrlKind, RestError};
pub use headers::{RequestSigner, SignContext};
pub use page::{HtmlPage, PageDocument};
pub use rate_limit::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, RateLimitSnapshot};
pub use request::{RequestBuilder, RestRequest};
pub use response::{
    CamelizeFn, ResponseBody, ResponseKind, ResponseStatus, RestResponse, camelize_keys,
};
pub use transport::{
    CacheMode, Credentials, HyperTransport, HyperTransportBuilder, Transport, TransportRequest,
    TransportResponse,
};
pub use url_builder::{UrlBuilder, UrlTarget};
