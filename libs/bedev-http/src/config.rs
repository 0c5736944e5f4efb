use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Default User-Agent string sent by [`HyperTransport`](crate::HyperTransport)
pub const DEFAULT_USER_AGENT: &str = concat!("bedev-http/", env!("CARGO_PKG_VERSION"));

/// Default name of the CSRF token request/response header
pub const DEFAULT_CSRF_HEADER: &str = "x-csrf-token";

/// Account-token identifier used when a request does not name one
pub const DEFAULT_ACCOUNT_TOKEN: &str = "default";

/// Protocol prefixed to bare `host/path` targets
pub const DEFAULT_PROTOCOL: &str = "https";

/// Host names of the API family
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Domains {
    /// Main API domain. Requests to this host or any of its sub-domains take
    /// part in CSRF handling and challenge resolution.
    pub main: String,
    /// Static content domain. Targets on this host are never rewritten.
    pub cdn: String,
}

impl Default for Domains {
    fn default() -> Self {
        Self {
            main: "roblox.com".to_owned(),
            cdn: "rbxcdn.com".to_owned(),
        }
    }
}

/// Exponential backoff applied between transient-error retries
///
/// Computes delay as: `min(initial * multiplier^attempt, max)` with optional jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    pub initial: Duration,

    /// Maximum backoff duration (default: 10s)
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Adds a random 0-25% on top of each delay (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Create backoff with custom initial and max durations
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// Create fast backoff for testing (1ms initial, 100ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    ///
    /// Safely handles edge cases (NaN, infinity, negative values) to avoid panics.
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        const MAX_BACKOFF_SECS: f64 = 86400.0;

        let attempt_i32 = i32::try_from(attempt).unwrap_or(i32::MAX);

        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };

        let initial_secs = self.initial.as_secs_f64();
        let max_secs = self.max.as_secs_f64().min(MAX_BACKOFF_SECS);

        let base = initial_secs * multiplier.powi(attempt_i32);
        let clamped = if base.is_finite() {
            base.min(max_secs).max(0.0)
        } else {
            max_secs
        };
        let duration = Duration::from_secs_f64(clamped);

        if self.jitter {
            use rand::Rng;
            let jitter_factor = rand::rng().random_range(0.0..=0.25);
            duration + duration.mul_f64(jitter_factor)
        } else {
            duration
        }
    }
}

/// Client configuration
///
/// Plain data only, so it can be embedded in a module's YAML config. Trait-object
/// collaborators (transport, signer, camelizer, page document, parsers) are set on
/// [`BedevClientBuilder`](crate::BedevClientBuilder).
///
/// # Example
///
/// ```yaml
/// domains:
///   main: roblox.com
///   cdn: rbxcdn.com
/// is_dev: false
/// tracking_search_param: _tracking
/// override_device_type_to_user_agent:
///   xbox: "Roblox/XboxOne"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub domains: Domains,

    /// Client runs embedded in a website page. Enables the CSRF meta-tag fallback.
    pub on_website: bool,

    /// Development mode: absolute URLs are kept verbatim (scheme included) and
    /// `https://localhost` is downgraded to `http://localhost`.
    pub is_dev: bool,

    /// Header carrying the device-override tag. When unset, the tag is mapped to
    /// a user agent through `override_device_type_to_user_agent`.
    pub override_device_type_header_name: Option<String>,

    /// Device-override tag to User-Agent mapping
    pub override_device_type_to_user_agent: HashMap<String, String>,

    /// User-Agent sent when no device override is requested
    pub tracking_user_agent: Option<String>,

    /// Query parameter appended (empty) when no device override is requested.
    /// Takes precedence over `tracking_user_agent`.
    pub tracking_search_param: Option<String>,

    /// Query parameter that carries the request's account-token identifier
    pub account_token_search_param: Option<String>,

    /// CSRF header name (default: `x-csrf-token`)
    pub csrf_header_name: String,

    /// Location host-relative paths (`/v1/...`) resolve against.
    /// Default: `https://www.{domains.main}/`
    pub page_location: Option<Url>,

    /// Delay between transient-error retries. `None` retries immediately.
    #[serde(skip)]
    pub retry_backoff: Option<ExponentialBackoff>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            domains: Domains::default(),
            on_website: false,
            is_dev: false,
            override_device_type_header_name: None,
            override_device_type_to_user_agent: HashMap::new(),
            tracking_user_agent: None,
            tracking_search_param: None,
            account_token_search_param: None,
            csrf_header_name: DEFAULT_CSRF_HEADER.to_owned(),
            page_location: None,
            retry_backoff: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for tests against local mock servers
    ///
    /// Dev mode keeps `http://127.0.0.1:<port>` targets verbatim; the main domain
    /// is the loopback address so CSRF and challenge handling apply.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            domains: Domains {
                main: "127.0.0.1".to_owned(),
                cdn: "cdn.invalid".to_owned(),
            },
            is_dev: true,
            ..Default::default()
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the transport enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (dev mode and mock servers only)
    AllowInsecureHttp,
}

/// Configuration of the bundled [`HyperTransport`](crate::HyperTransport)
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-attempt timeout (default: 30 seconds)
    pub request_timeout: Duration,

    /// Maximum buffered response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent applied when the request carries none
    pub user_agent: String,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Maximum number of redirects to follow (default: 20). `0` disables following.
    pub max_redirects: usize,

    /// Idle pooled connection lifetime (default: 90 seconds)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            max_redirects: 20,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl TransportConfig {
    /// Create configuration for testing with mock servers (allows insecure HTTP)
    ///
    /// **WARNING**: This configuration allows plain HTTP connections.
    /// Use only for local testing with mock servers, never in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            transport: TransportSecurity::AllowInsecureHttp,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.domains.main, "roblox.com");
        assert_eq!(config.csrf_header_name, DEFAULT_CSRF_HEADER);
        assert!(!config.is_dev);
        assert!(!config.on_website);
        assert!(config.retry_backoff.is_none());
    }

    #[test]
    fn test_client_config_deserialize_partial() {
        let config: ClientConfig = serde_json::from_value(serde_json::json!({
            "domains": { "main": "example.com" },
            "is_dev": true,
            "tracking_search_param": "_t",
            "page_location": "https://www.example.com/home"
        }))
        .unwrap();

        assert_eq!(config.domains.main, "example.com");
        assert_eq!(config.domains.cdn, "rbxcdn.com");
        assert!(config.is_dev);
        assert_eq!(config.tracking_search_param.as_deref(), Some("_t"));
        assert_eq!(
            config.page_location.unwrap().as_str(),
            "https://www.example.com/home"
        );
    }

    #[test]
    fn test_client_config_rejects_unknown_fields() {
        let result: Result<ClientConfig, _> =
            serde_json::from_value(serde_json::json!({ "isDev": true }));
        assert!(result.is_err());
    }

    #[test]
    fn test_backoff_without_jitter_grows_and_caps() {
        let backoff = ExponentialBackoff {
            initial: Duration::from_millis(125),
            max: Duration::from_millis(750),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(125));
        assert_eq!(backoff.delay(1), Duration::from_millis(250));
        assert_eq!(backoff.delay(2), Duration::from_millis(500));
        assert_eq!(backoff.delay(3), Duration::from_millis(750));
        assert_eq!(backoff.delay(usize::MAX), Duration::from_millis(750));
    }

    #[test]
    fn test_backoff_invalid_multiplier_is_sanitized() {
        let backoff = ExponentialBackoff {
            multiplier: f64::NAN,
            jitter: false,
            ..ExponentialBackoff::fast()
        };
        assert_eq!(backoff.delay(5), Duration::from_millis(1));
    }
}
