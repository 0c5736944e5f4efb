use crate::api_errors::ErrorHandling;
use crate::body::{FormPart, RequestBody};
use crate::challenge::ChallengeHandler;
use crate::client::BedevClient;
use crate::error::HttpError;
use crate::response::{ResponseKind, RestResponse};
use crate::transport::CacheMode;
use crate::url_builder::UrlTarget;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Everything needed to perform one logical request
///
/// Shared immutably (behind `Arc`) by every attempt and by the responses they
/// produce. Retries work on their own copy of `headers`.
#[derive(Clone)]
pub struct RestRequest {
    pub method: Method,
    /// Absolute URL, host-relative path or bare `host/path`
    pub url: String,
    /// Query entries; `None` values are skipped
    pub query: Vec<(String, Option<String>)>,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Decoding applied to a successful body (default: JSON)
    pub expect: ResponseKind,
    /// `Some(true)` sends credentials and selects the per-account CSRF slot;
    /// `Some(false)` strips them; `None` leaves the transport default
    pub credentials: Option<bool>,
    /// Camelize JSON keys of the decoded body (needs a client camelizer)
    pub camelize: bool,
    pub cache: Option<CacheMode>,
    /// Route through the client's CORS-bypass transport, when configured
    pub bypass_cors: bool,
    /// Account the request acts for (default account when `None`)
    pub account_token: Option<String>,
    /// Device class to impersonate
    pub device_override: Option<String>,
    /// Attach the CSRF token; `None` attaches it for every method but GET
    pub include_csrf: Option<bool>,
    /// Extra attempts allowed for 500/502/503/504 responses
    pub retries: usize,
    pub error_handling: ErrorHandling,
    pub challenge_handler: Option<Arc<dyn ChallengeHandler>>,
}

impl fmt::Debug for RestRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("expect", &self.expect)
            .field("credentials", &self.credentials)
            .field("camelize", &self.camelize)
            .field("cache", &self.cache)
            .field("bypass_cors", &self.bypass_cors)
            .field("account_token", &self.account_token)
            .field("device_override", &self.device_override)
            .field("include_csrf", &self.include_csrf)
            .field("retries", &self.retries)
            .field("error_handling", &self.error_handling)
            .field("challenge_handler", &self.challenge_handler.is_some())
            .finish()
    }
}

impl RestRequest {
    /// Request with default options: JSON response, BEDEV1 errors, no retries
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            expect: ResponseKind::default(),
            credentials: None,
            camelize: false,
            cache: None,
            bypass_cors: false,
            account_token: None,
            device_override: None,
            include_csrf: None,
            retries: 0,
            error_handling: ErrorHandling::default(),
            challenge_handler: None,
        }
    }

    /// Whether the CSRF token goes on this request
    #[must_use]
    pub fn wants_csrf(&self) -> bool {
        self.include_csrf.unwrap_or(self.method != Method::GET)
    }

    /// Credentials mode selecting the per-account CSRF slot
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.credentials == Some(true)
    }

    pub(crate) fn url_target(&self) -> UrlTarget<'_> {
        UrlTarget {
            path: &self.url,
            query: &self.query,
            account_token: self.account_token.as_deref(),
            device_override: self.device_override.as_deref(),
        }
    }
}

/// Fluent builder for a [`RestRequest`]
///
/// Created by [`BedevClient::get`], [`BedevClient::post`], etc. Invalid header
/// names or values are reported by [`send()`](RequestBuilder::send).
///
/// # Example
///
/// ```ignore
/// let user: User = client
///     .get("users.roblox.com/v1/users/1")
///     .credentials(true)
///     .retries(2)
///     .send()
///     .await?
///     .json()?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    client: BedevClient,
    request: RestRequest,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: BedevClient, method: Method, url: String) -> Self {
        Self {
            client,
            request: RestRequest::new(method, url),
            error: None,
        }
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.push((key.into(), Some(value.into())));
        self
    }

    /// Append a query parameter when `value` is present
    pub fn query_opt(mut self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.request
            .query
            .push((key.into(), value.map(Into::into)));
        self
    }

    /// Add a single header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.request.headers.append(name, value);
            }
            (Err(e), _) => {
                self.error = Some(HttpError::InvalidHeaderName(e));
            }
            (_, Err(e)) => {
                self.error = Some(HttpError::InvalidHeaderValue(e));
            }
        }
        self
    }

    /// Add every header of `headers`
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.request.headers.extend(headers);
        self
    }

    /// Set request body as JSON
    ///
    /// # Errors
    /// Returns `Err(HttpError::Json)` if serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        self.request.body = Some(RequestBody::json(body)?);
        Ok(self)
    }

    /// Set request body from JSON text, keeping integers of any size exact
    ///
    /// # Errors
    /// Returns `Err(HttpError::Json)` if `text` is not valid JSON.
    pub fn json_big_int(mut self, text: &str) -> Result<Self, HttpError> {
        self.request.body = Some(RequestBody::json_big_int(text)?);
        Ok(self)
    }

    /// Set request body as form URL-encoded
    ///
    /// # Errors
    /// Returns `Err(HttpError::FormEncode)` if `body` is not a flat key/value structure.
    pub fn form<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        let encoded = serde_urlencoded::to_string(body)?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&encoded)?;
        self.request.body = Some(RequestBody::UrlEncoded(pairs));
        Ok(self)
    }

    /// Set request body as multipart form data
    pub fn form_data(mut self, parts: Vec<(String, FormPart)>) -> Self {
        self.request.body = Some(RequestBody::FormData(parts));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.request.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn file(mut self, contents: impl Into<Bytes>) -> Self {
        self.request.body = Some(RequestBody::File(contents.into()));
        self
    }

    /// Opaque body sent unchanged, without a content type
    pub fn raw(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = Some(RequestBody::Raw(body.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.request.body = Some(body);
        self
    }

    pub fn expect(mut self, kind: ResponseKind) -> Self {
        self.request.expect = kind;
        self
    }

    pub fn credentials(mut self, include: bool) -> Self {
        self.request.credentials = Some(include);
        self
    }

    pub fn camelize(mut self, camelize: bool) -> Self {
        self.request.camelize = camelize;
        self
    }

    pub fn cache(mut self, cache: CacheMode) -> Self {
        self.request.cache = Some(cache);
        self
    }

    pub fn bypass_cors(mut self, bypass: bool) -> Self {
        self.request.bypass_cors = bypass;
        self
    }

    pub fn account_token(mut self, account_token: impl Into<String>) -> Self {
        self.request.account_token = Some(account_token.into());
        self
    }

    pub fn device_override(mut self, device: impl Into<String>) -> Self {
        self.request.device_override = Some(device.into());
        self
    }

    pub fn include_csrf(mut self, include: bool) -> Self {
        self.request.include_csrf = Some(include);
        self
    }

    /// Retry budget for transient 5xx responses
    pub fn retries(mut self, retries: usize) -> Self {
        self.request.retries = retries;
        self
    }

    pub fn error_handling(mut self, mode: ErrorHandling) -> Self {
        self.request.error_handling = mode;
        self
    }

    pub fn challenge_handler(mut self, handler: Arc<dyn ChallengeHandler>) -> Self {
        self.request.challenge_handler = Some(handler);
        self
    }

    /// Finish building without sending
    ///
    /// # Errors
    /// Returns the first error captured while building.
    pub fn build(self) -> Result<RestRequest, HttpError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.request),
        }
    }

    /// Send the request through the client
    ///
    /// # Errors
    /// Returns any building error, transport failure or terminal API error
    /// ([`HttpError::Rest`]).
    pub async fn send(self) -> Result<RestResponse, HttpError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.client.request(self.request).await
    }
}
