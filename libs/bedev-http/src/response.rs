use crate::error::HttpError;
use crate::page::HtmlPage;
use crate::rate_limit::RateLimitSnapshot;
use crate::request::RestRequest;
use crate::transport::TransportResponse;
use heck::ToLowerCamelCase;
use http::{HeaderMap, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Rewrites the keys of a decoded JSON body
pub type CamelizeFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// How a successful response body is decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Body is not decoded
    None,
    #[default]
    Json,
    Text,
    Bytes,
    /// `application/x-www-form-urlencoded` pairs
    Form,
    /// HTML document
    Dom,
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    Bytes(bytes::Bytes),
    Form(Vec<(String, String)>),
    Dom(HtmlPage),
}

/// `ok`, numeric code and status text of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    pub ok: bool,
    pub code: u16,
    pub text: String,
}

/// Response of one dispatched attempt
///
/// Keeps the buffered transport response, so the body can be decoded again
/// with [`json`](Self::json) or [`text`](Self::text) whatever the requested kind.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: ResponseStatus,
    pub headers: HeaderMap,
    /// Final URL after redirects
    pub url: String,
    pub redirected: bool,
    /// `None` for [`ResponseKind::None`], empty bodies and 204 responses
    pub body: Option<ResponseBody>,
    pub rate_limit: Option<RateLimitSnapshot>,
    /// Request this response answers
    pub request: Arc<RestRequest>,
    pub raw: TransportResponse,
}

impl RestResponse {
    /// Wrap a transport response, decoding the body as `kind`.
    ///
    /// JSON bodies are passed through `camelizer` when `camelize` is set on the
    /// request and a camelizer is available.
    ///
    /// # Errors
    /// Returns `HttpError::Json` or `HttpError::FormDecode` if the body does not
    /// match `kind`.
    pub fn from_transport(
        raw: TransportResponse,
        request: Arc<RestRequest>,
        kind: ResponseKind,
        camelizer: Option<&CamelizeFn>,
    ) -> Result<Self, HttpError> {
        let skip_body = kind == ResponseKind::None
            || raw.content_length() == 0
            || raw.status == StatusCode::NO_CONTENT;

        let body = if skip_body {
            None
        } else {
            Some(decode_body(&raw, kind, camelizer.filter(|_| request.camelize))?)
        };

        Ok(Self {
            status: ResponseStatus {
                ok: raw.ok(),
                code: raw.status.as_u16(),
                text: raw.status_text.clone(),
            },
            headers: raw.headers.clone(),
            url: raw.url.clone(),
            redirected: raw.redirected,
            body,
            rate_limit: None,
            request,
            raw,
        })
    }

    /// Attach the rate-limit snapshot observed on this response
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitSnapshot>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn ok(&self) -> bool {
        self.status.ok
    }

    /// Deserialize the raw body as JSON, ignoring the decoded kind
    ///
    /// # Errors
    /// Returns `HttpError::Json` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.raw.body)?)
    }

    /// Raw body as UTF-8 text (lossy)
    #[must_use]
    pub fn text(&self) -> String {
        self.raw.text()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }
}

fn decode_body(
    raw: &TransportResponse,
    kind: ResponseKind,
    camelizer: Option<&CamelizeFn>,
) -> Result<ResponseBody, HttpError> {
    let body = match kind {
        ResponseKind::None | ResponseKind::Json => {
            let value: Value = serde_json::from_slice(&raw.body)?;
            ResponseBody::Json(match camelizer {
                Some(camelize) => camelize(value),
                None => value,
            })
        }
        ResponseKind::Text => ResponseBody::Text(raw.text()),
        ResponseKind::Bytes => ResponseBody::Bytes(raw.body.clone()),
        ResponseKind::Form => ResponseBody::Form(serde_urlencoded::from_bytes(&raw.body)?),
        ResponseKind::Dom => ResponseBody::Dom(HtmlPage::new(raw.text())),
    };
    Ok(body)
}

/// Default camelizer: rewrites every object key to `lowerCamelCase`, recursively
#[must_use]
pub fn camelize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key.to_lower_camel_case(), camelize_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(camelize_keys).collect()),
        other => other,
    }
}
