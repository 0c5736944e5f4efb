use crate::api_errors::{Bedev1ErrorParser, Bedev2ErrorParser, ErrorParser};
use crate::challenge::{ChallengeParser, HeaderChallengeParser};
use crate::client::{BedevClient, ClientInner};
use crate::config::{ClientConfig, TransportConfig, TransportSecurity};
use crate::csrf::CsrfTokenStore;
use crate::error::HttpError;
use crate::headers::RequestSigner;
use crate::page::PageDocument;
use crate::response::CamelizeFn;
use crate::transport::{HyperTransportBuilder, Transport};
use http::HeaderName;
use serde_json::Value;
use std::sync::Arc;

/// Builder for constructing a [`BedevClient`]
///
/// Without an explicit [`transport`](Self::transport) the client uses a
/// [`HyperTransport`](crate::HyperTransport) built from the transport config.
pub struct BedevClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    transport_config: Option<TransportConfig>,
    bypass_cors_transport: Option<Arc<dyn Transport>>,
    signer: Option<Arc<dyn RequestSigner>>,
    camelizer: Option<CamelizeFn>,
    page: Option<Arc<dyn PageDocument>>,
    challenge_parser: Arc<dyn ChallengeParser>,
    bedev1_parser: Arc<dyn ErrorParser>,
    bedev2_parser: Arc<dyn ErrorParser>,
}

impl BedevClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
            transport_config: None,
            bypass_cors_transport: None,
            signer: None,
            camelizer: None,
            page: None,
            challenge_parser: Arc::new(HeaderChallengeParser),
            bedev1_parser: Arc::new(Bedev1ErrorParser),
            bedev2_parser: Arc::new(Bedev2ErrorParser),
        }
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self::new().config(config)
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of the bundled one
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Configuration of the bundled transport; ignored when a custom
    /// [`transport`](Self::transport) is set
    #[must_use]
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = Some(config);
        self
    }

    /// Transport used by requests with `bypass_cors` set
    #[must_use]
    pub fn bypass_cors_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.bypass_cors_transport = Some(transport);
        self
    }

    /// Signer whose headers are merged into every request
    #[must_use]
    pub fn signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Key rewriter applied to JSON bodies of requests with `camelize` set
    #[must_use]
    pub fn camelizer<F>(mut self, camelizer: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.camelizer = Some(Arc::new(camelizer));
        self
    }

    /// Hosting page, read for the `csrf-token` meta tag when `on_website` is set
    #[must_use]
    pub fn page_document(mut self, page: Arc<dyn PageDocument>) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn challenge_parser(mut self, parser: Arc<dyn ChallengeParser>) -> Self {
        self.challenge_parser = parser;
        self
    }

    #[must_use]
    pub fn bedev1_error_parser(mut self, parser: Arc<dyn ErrorParser>) -> Self {
        self.bedev1_parser = parser;
        self
    }

    #[must_use]
    pub fn bedev2_error_parser(mut self, parser: Arc<dyn ErrorParser>) -> Self {
        self.bedev2_parser = parser;
        self
    }

    /// Build the client
    ///
    /// # Errors
    /// - `HttpError::InvalidHeaderName` if the CSRF header name is invalid
    /// - Transport construction errors (TLS setup, invalid user agent)
    pub fn build(self) -> Result<BedevClient, HttpError> {
        let csrf_header = HeaderName::from_bytes(self.config.csrf_header_name.as_bytes())?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HyperTransportBuilder::with_config(default_transport_config(
                    &self.config,
                    self.transport_config,
                ))
                .build()?,
            ),
        };

        let csrf = match (self.page, self.config.on_website) {
            (Some(page), true) => CsrfTokenStore::with_page_fallback(page),
            (Some(_), false) => {
                tracing::warn!("page document ignored: client is not on a website");
                CsrfTokenStore::new()
            }
            (None, _) => CsrfTokenStore::new(),
        };

        tracing::debug!(
            main_domain = %self.config.domains.main,
            is_dev = self.config.is_dev,
            on_website = self.config.on_website,
            "bedev client built"
        );

        Ok(BedevClient {
            inner: Arc::new(ClientInner {
                config: self.config,
                csrf_header,
                transport,
                bypass_cors_transport: self.bypass_cors_transport,
                signer: self.signer,
                camelizer: self.camelizer,
                challenge_parser: self.challenge_parser,
                bedev1_parser: self.bedev1_parser,
                bedev2_parser: self.bedev2_parser,
                csrf,
            }),
        })
    }
}

impl Default for BedevClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Dev mode talks to plain-HTTP local servers unless told otherwise
fn default_transport_config(
    config: &ClientConfig,
    explicit: Option<TransportConfig>,
) -> TransportConfig {
    explicit.unwrap_or_else(|| {
        if config.is_dev {
            tracing::warn!(
                target: "bedev_http::security",
                "dev mode - HTTP traffic will NOT be encrypted"
            );
            TransportConfig {
                transport: TransportSecurity::AllowInsecureHttp,
                ..TransportConfig::default()
            }
        } else {
            TransportConfig::default()
        }
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::page::HtmlPage;
    use crate::response::{ResponseBody, camelize_keys};
    use crate::transport::{TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use http::StatusCode;
    use serde_json::json;

    struct JsonTransport(&'static str);

    #[async_trait]
    impl Transport for JsonTransport {
        async fn fetch(&self, request: TransportRequest) -> Result<TransportResponse, HttpError> {
            Ok(TransportResponse::new(StatusCode::OK, request.url.as_str(), self.0))
        }
    }

    #[tokio::test]
    async fn test_build_with_bundled_transport() {
        let client = BedevClientBuilder::new().build().unwrap();
        assert_eq!(client.config().domains.main, "roblox.com");
    }

    #[test]
    fn test_invalid_csrf_header_name() {
        let config = ClientConfig {
            csrf_header_name: "bad header".to_owned(),
            ..ClientConfig::default()
        };
        let result = BedevClientBuilder::with_config(config).build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderName(_))));
    }

    #[test]
    fn test_dev_mode_allows_insecure_transport() {
        let dev = ClientConfig::for_testing();
        assert_eq!(
            default_transport_config(&dev, None).transport,
            TransportSecurity::AllowInsecureHttp
        );
        assert_eq!(
            default_transport_config(&ClientConfig::default(), None).transport,
            TransportSecurity::TlsOnly
        );
        assert_eq!(
            default_transport_config(&dev, Some(TransportConfig::default())).transport,
            TransportSecurity::TlsOnly
        );
    }

    #[test]
    fn test_dev_mode_warning_emitted() {
        use std::sync::Mutex;
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct WarningCapture {
            warnings: Arc<Mutex<Vec<String>>>,
        }

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::WARN {
                    let mut visitor = MessageVisitor(String::new());
                    event.record(&mut visitor);
                    self.warnings.lock().unwrap().push(visitor.0);
                }
            }
        }

        struct MessageVisitor(String);
        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        let capture = WarningCapture::default();
        let warnings = capture.warnings.clone();
        let subscriber = tracing_subscriber::registry().with(capture);

        tracing::subscriber::with_default(subscriber, || {
            _ = default_transport_config(&ClientConfig::for_testing(), None);
        });

        let captured = warnings.lock().unwrap();
        assert!(
            captured.iter().any(|w| w.contains("HTTP traffic")),
            "warning should mention insecure HTTP: {:?}",
            *captured
        );
    }

    #[test]
    fn test_page_fallback_only_on_website() {
        let page: Arc<dyn PageDocument> = Arc::new(HtmlPage::new(
            r#"<meta name="csrf-token" data-token="from-page">"#,
        ));
        let transport: Arc<dyn Transport> = Arc::new(JsonTransport("{}"));

        let off_site = BedevClientBuilder::new()
            .transport(Arc::clone(&transport))
            .page_document(Arc::clone(&page))
            .build()
            .unwrap();
        assert_eq!(off_site.csrf_store().get(true, None), None);

        let config = ClientConfig {
            on_website: true,
            ..ClientConfig::default()
        };
        let on_site = BedevClientBuilder::with_config(config)
            .transport(transport)
            .page_document(page)
            .build()
            .unwrap();
        assert_eq!(
            on_site.csrf_store().get(true, None).as_deref(),
            Some("from-page")
        );
    }

    #[tokio::test]
    async fn test_custom_camelizer_applied() {
        let client = BedevClientBuilder::new()
            .transport(Arc::new(JsonTransport(r#"{"user_id":7}"#)))
            .camelizer(camelize_keys)
            .build()
            .unwrap();

        let resp = client
            .get("users.roblox.com/v1/users/7")
            .camelize(true)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.body, Some(ResponseBody::Json(json!({"userId": 7}))));
    }
}
