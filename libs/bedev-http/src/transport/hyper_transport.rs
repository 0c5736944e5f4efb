use super::{CacheMode, Credentials, Transport, TransportRequest, TransportResponse};
use crate::config::{TransportConfig, TransportSecurity};
use crate::error::{HttpError, InvalidUrlKind};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CACHE_CONTROL, COOKIE, USER_AGENT};
use http::{HeaderValue, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::policy::Limited;
use tower_http::follow_redirect::{FollowRedirectLayer, RequestUri};

/// Type-erased response body after decompression
type BoxedBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

type HyperService = BoxCloneSyncService<http::Request<Full<Bytes>>, Response<BoxedBody>, HttpError>;

/// Default [`Transport`] backed by hyper and rustls
///
/// Stack (outer to inner): `Timeout → Decompression → FollowRedirect → hyper client`.
/// Each call to [`Transport::fetch`] is one attempt; retries belong to the client.
#[derive(Clone)]
pub struct HyperTransport {
    service: HyperService,
    max_body_size: usize,
    user_agent: HeaderValue,
    transport_security: TransportSecurity,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("max_body_size", &self.max_body_size)
            .field("user_agent", &self.user_agent)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a builder with default configuration
    #[must_use]
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Check the URL scheme against the transport security mode
    fn validate_scheme(&self, url: &url::Url) -> Result<(), HttpError> {
        match url.scheme() {
            "https" => Ok(()),
            "http" => match self.transport_security {
                TransportSecurity::AllowInsecureHttp => Ok(()),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            scheme => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
        }
    }

    /// Turn a [`TransportRequest`] into the wire request
    fn prepare(&self, request: TransportRequest) -> Result<http::Request<Full<Bytes>>, HttpError> {
        self.validate_scheme(&request.url)?;
        if !request.url.has_host() {
            return Err(HttpError::InvalidUrl {
                url: request.url.to_string(),
                kind: InvalidUrlKind::MissingAuthority,
                reason: "URL has no host".to_owned(),
            });
        }

        let mut headers = request.headers;
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, self.user_agent.clone());
        }

        if !headers.contains_key(CACHE_CONTROL) {
            let directive = match request.cache {
                Some(CacheMode::NoStore) => Some("no-store"),
                Some(CacheMode::NoCache | CacheMode::Reload) => Some("no-cache"),
                _ => None,
            };
            if let Some(directive) = directive {
                headers.insert(CACHE_CONTROL, HeaderValue::from_static(directive));
            }
        }

        if request.credentials == Some(Credentials::Omit) {
            headers.remove(COOKIE);
            headers.remove(AUTHORIZATION);
        }

        let mut http_request = http::Request::builder()
            .method(request.method)
            .uri(request.url.as_str())
            .body(Full::new(request.body.unwrap_or_default()))?;
        *http_request.headers_mut() = headers;

        Ok(http_request)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse, HttpError> {
        let method = request.method.clone();
        let http_request = self.prepare(request)?;
        let original_uri = http_request.uri().clone();

        tracing::trace!(%method, uri = %original_uri, "sending request");

        let response = self.service.clone().oneshot(http_request).await?;

        let final_uri = response
            .extensions()
            .get::<RequestUri>()
            .map_or_else(|| original_uri.clone(), |u| u.0.clone());
        let redirected = final_uri != original_uri;
        let status = response.status();
        let status_text = response
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map_or_else(
                || status.canonical_reason().unwrap_or_default().to_owned(),
                |reason| String::from_utf8_lossy(reason.as_bytes()).into_owned(),
            );

        let (parts, body) = response.into_parts();
        let body = read_body_limited(body, self.max_body_size).await?;

        tracing::debug!(
            %method,
            status = status.as_u16(),
            redirected,
            bytes = body.len(),
            "response received"
        );

        Ok(TransportResponse {
            status,
            status_text,
            headers: parts.headers,
            url: uri_to_string(&final_uri),
            redirected,
            body,
        })
    }
}

/// `http::Uri` renders origin-form URIs without the trailing slash `Url` uses
fn uri_to_string(uri: &Uri) -> String {
    url::Url::parse(&uri.to_string()).map_or_else(|_| uri.to_string(), String::from)
}

/// Builder for [`HyperTransport`]
pub struct HyperTransportBuilder {
    config: TransportConfig,
}

impl HyperTransportBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
        }
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the user agent applied when a request carries none
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum buffered response body size
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set the maximum number of redirects followed per request
    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Allow insecure HTTP connections (development and mock servers only)
    ///
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "bedev_http::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Build the transport
    ///
    /// # Errors
    /// Returns an error if the user agent is not a valid header value or the
    /// TLS connector cannot be initialised.
    pub fn build(self) -> Result<HyperTransport, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for development or with mock servers"
            );
        }

        let timeout = self.config.request_timeout;
        let user_agent = HeaderValue::from_str(&self.config.user_agent)?;

        let https = super::tls::https_connector(self.config.tls_roots, self.config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = self.config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(Limited::new(
                self.config.max_redirects,
            )))
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        Ok(HyperTransport {
            service: BoxCloneSyncService::new(service),
            max_body_size: self.config.max_body_size,
            user_agent,
            transport_security: self.config.transport,
        })
    }
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map tower errors to `HttpError` with the actual timeout duration
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Box the decompression body so the service type stays nameable
fn map_decompression_response<B>(response: Response<B>) -> Response<BoxedBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: BoxedBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Collect the (decompressed) body, failing once it exceeds `limit` bytes
async fn read_body_limited(body: BoxedBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
