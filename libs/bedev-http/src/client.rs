use crate::api_errors::{ErrorHandling, ErrorParser, render_error_message};
use crate::builder::BedevClientBuilder;
use crate::challenge::ChallengeParser;
use crate::config::ClientConfig;
use crate::csrf::CsrfTokenStore;
use crate::error::{HttpError, RestError};
use crate::headers::RequestSigner;
use crate::rate_limit::RateLimitSnapshot;
use crate::request::{RequestBuilder, RestRequest};
use crate::response::{CamelizeFn, ResponseKind, RestResponse};
use crate::transport::Transport;
use crate::url_builder::UrlBuilder;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::sync::Arc;

/// Statuses retried while a request has budget left
const TRANSIENT_STATUSES: [StatusCode; 4] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// State shared by every clone of a [`BedevClient`]
pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) csrf_header: HeaderName,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) bypass_cors_transport: Option<Arc<dyn Transport>>,
    pub(crate) signer: Option<Arc<dyn RequestSigner>>,
    pub(crate) camelizer: Option<CamelizeFn>,
    pub(crate) challenge_parser: Arc<dyn ChallengeParser>,
    pub(crate) bedev1_parser: Arc<dyn ErrorParser>,
    pub(crate) bedev2_parser: Arc<dyn ErrorParser>,
    pub(crate) csrf: CsrfTokenStore,
}

/// Client for the BEDEV web API family
///
/// Adds the API's conventions on top of a [`Transport`]: URL resolution against
/// the configured domains, CSRF token rotation, challenge replay, rate-limit
/// capture, transient-error retries and structured error reporting.
///
/// # Thread Safety
///
/// `BedevClient` is `Clone + Send + Sync`; clones share the transport and the
/// CSRF token cache.
///
/// # Example
///
/// ```ignore
/// let client = BedevClient::builder().build()?;
///
/// let resp = client
///     .post("auth.roblox.com/v2/logout")
///     .credentials(true)
///     .send()
///     .await?;
/// ```
#[derive(Clone)]
pub struct BedevClient {
    pub(crate) inner: Arc<ClientInner>,
}

impl std::fmt::Debug for BedevClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedevClient")
            .field("config", &self.inner.config)
            .field("csrf", &self.inner.csrf)
            .finish_non_exhaustive()
    }
}

impl BedevClient {
    /// Create a builder for configuring the client
    #[must_use]
    pub fn builder() -> BedevClientBuilder {
        BedevClientBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// CSRF token cache of this client
    #[must_use]
    pub fn csrf_store(&self) -> &CsrfTokenStore {
        &self.inner.csrf
    }

    /// Create a request builder for any method
    pub fn method(&self, method: Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(self.clone(), method, url.to_owned())
    }

    /// Create a GET request builder
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.method(Method::GET, url)
    }

    /// Create a POST request builder
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.method(Method::POST, url)
    }

    /// Create a PUT request builder
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.method(Method::PUT, url)
    }

    /// Create a PATCH request builder
    pub fn patch(&self, url: &str) -> RequestBuilder {
        self.method(Method::PATCH, url)
    }

    /// Create a DELETE request builder
    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.method(Method::DELETE, url)
    }

    /// Perform a request, applying CSRF rotation, challenge replay and retries
    ///
    /// CSRF rotation and resolved challenges re-send the request without
    /// consuming `retries`; only 500/502/503/504 responses do. A 403 whose
    /// CSRF header repeats the token just sent is not rotated and is handled
    /// like any other failed response.
    ///
    /// # Errors
    /// - `HttpError::Rest` for a failed response when error handling is enabled
    /// - URL, header, signer, challenge-handler and transport errors as they occur
    pub async fn request(&self, request: RestRequest) -> Result<RestResponse, HttpError> {
        let inner = &*self.inner;
        let request = Arc::new(request);

        let url = UrlBuilder::new(&inner.config).build(&request.url_target())?;
        let main_host = UrlBuilder::new(&inner.config).is_main_host(&url);
        let mut headers = request.headers.clone();

        if main_host
            && request.wants_csrf()
            && let Some(token) = inner
                .csrf
                .get(request.is_authorized(), request.account_token.as_deref())
        {
            headers.insert(inner.csrf_header.clone(), HeaderValue::from_str(&token)?);
        }

        let mut retries_left = request.retries;
        let mut attempt: usize = 0;

        loop {
            let response = inner
                .dispatch(&request, &headers, ResponseKind::None)
                .await?;

            if main_host && inner.rotate_csrf(&request, &response, &mut headers)? {
                continue;
            }

            let rate_limit = RateLimitSnapshot::from_headers(&response.headers);

            if main_host
                && !response.ok()
                && inner.resolve_challenge(&request, &response, &mut headers).await?
            {
                continue;
            }

            if request.error_handling != ErrorHandling::None && !response.ok() {
                let status = response.raw.status;
                if retries_left > 0 && TRANSIENT_STATUSES.contains(&status) {
                    retries_left -= 1;
                    tracing::debug!(
                        retry = attempt + 1,
                        status = status.as_u16(),
                        retries_left,
                        "retrying transient failure"
                    );
                    if let Some(backoff) = &inner.config.retry_backoff {
                        tokio::time::sleep(backoff.delay(attempt)).await;
                    }
                    attempt += 1;
                    continue;
                }
                return Err(inner.rest_error(response, request.error_handling, rate_limit));
            }

            let decoded = inner.decode_final(response, &request)?;
            return Ok(decoded.with_rate_limit(rate_limit));
        }
    }
}

impl ClientInner {
    /// On a 403 carrying a new CSRF token, store it and update `headers`.
    /// Returns whether the request must be sent again.
    fn rotate_csrf(
        &self,
        request: &RestRequest,
        response: &RestResponse,
        headers: &mut HeaderMap,
    ) -> Result<bool, HttpError> {
        if response.raw.status != StatusCode::FORBIDDEN {
            return Ok(false);
        }
        let Some(token) = response.raw.headers.get(&self.csrf_header) else {
            return Ok(false);
        };
        // Same token as the one sent: no rotation
        if headers.get(&self.csrf_header) == Some(token) {
            tracing::warn!("csrf token rejected: response repeats the token sent");
            return Ok(false);
        }

        let token_text = token
            .to_str()
            .map_err(|_| HttpError::Transport("csrf token header is not valid ASCII".into()))?;
        self.csrf.set(
            token_text,
            request.is_authorized(),
            request.account_token.as_deref(),
        );
        headers.insert(self.csrf_header.clone(), token.clone());
        tracing::debug!(status = 403, "csrf token rotated, retrying");
        Ok(true)
    }

    /// Run the request's challenge handler on a challenged response.
    /// Returns whether the request must be sent again.
    async fn resolve_challenge(
        &self,
        request: &RestRequest,
        response: &RestResponse,
        headers: &mut HeaderMap,
    ) -> Result<bool, HttpError> {
        let Some(handler) = &request.challenge_handler else {
            return Ok(false);
        };
        let Some(challenge) = self.challenge_parser.parse(&response.raw.headers) else {
            return Ok(false);
        };

        tracing::debug!(
            status = response.status.code,
            challenge_type = %challenge.challenge_type,
            "challenge issued"
        );
        let solved = handler
            .handle(challenge)
            .await
            .map_err(HttpError::ChallengeHandler)?;

        match solved {
            Some(record) => {
                record.apply_to(headers)?;
                tracing::debug!(
                    challenge_type = %record.challenge_type,
                    "challenge resolved, retrying"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Decode the body of the returned response as the request's expected kind
    fn decode_final(
        &self,
        response: RestResponse,
        request: &Arc<RestRequest>,
    ) -> Result<RestResponse, HttpError> {
        RestResponse::from_transport(
            response.raw,
            Arc::clone(request),
            request.expect,
            self.camelizer.as_ref(),
        )
    }

    /// Terminal API error for a failed response
    fn rest_error(
        &self,
        response: RestResponse,
        mode: ErrorHandling,
        rate_limit: Option<RateLimitSnapshot>,
    ) -> HttpError {
        let parser = match mode {
            ErrorHandling::Bedev2 => &self.bedev2_parser,
            ErrorHandling::Bedev1 | ErrorHandling::None => &self.bedev1_parser,
        };
        let errors = parser.parse(&response.raw);
        let code = response.status.code;
        let message = render_error_message(&errors, code, &response.status.text);

        tracing::debug!(status = code, errors = errors.len(), url = %response.url, "request failed");

        HttpError::Rest(Box::new(RestError {
            message,
            errors,
            code,
            response: response.with_rate_limit(rate_limit.clone()),
            rate_limit,
        }))
    }
}
