//! Target URL resolution
//!
//! Requests name their target in one of three shapes: host-relative (`/v1/users`),
//! absolute (`https://users.roblox.com/v1/users`) or bare host and path
//! (`users.roblox.com/v1/users`). [`UrlBuilder`] turns all of them into a fully
//! qualified [`Url`] with the client's query-parameter conventions applied.

use crate::config::{ClientConfig, DEFAULT_PROTOCOL};
use crate::error::{HttpError, InvalidUrlKind};
use url::Url;

/// Inputs of one URL resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlTarget<'a> {
    pub path: &'a str,
    /// Query entries; `None` values are dropped
    pub query: &'a [(String, Option<String>)],
    pub account_token: Option<&'a str>,
    pub device_override: Option<&'a str>,
}

/// Resolves request targets against a [`ClientConfig`]
#[derive(Debug, Clone, Copy)]
pub struct UrlBuilder<'a> {
    config: &'a ClientConfig,
}

impl<'a> UrlBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a ClientConfig) -> Self {
        Self { config }
    }

    /// Build the fully qualified URL for `target`.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidUrl` when the target (or the page location it
    /// resolves against) is not a valid URL or has no host.
    pub fn build(&self, target: &UrlTarget<'_>) -> Result<Url, HttpError> {
        if self.is_cdn_target(target.path) {
            return qualify_cdn(target.path);
        }

        let mut query: Vec<(&str, &str)> = target
            .query
            .iter()
            .filter_map(|(key, value)| value.as_deref().map(|v| (key.as_str(), v)))
            .collect();

        if let (Some(token), Some(param)) = (
            target.account_token,
            self.config.account_token_search_param.as_deref(),
        ) {
            query.push((param, token));
        }

        if target.device_override.is_none()
            && let Some(param) = self.config.tracking_search_param.as_deref()
        {
            query.push((param, ""));
        }

        let mut url = self.resolve(target.path)?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        if self.config.is_dev
            && url.host_str() == Some("localhost")
            && url.scheme() == "https"
            && url.set_scheme("http").is_err()
        {
            tracing::warn!(url = %url, "could not downgrade localhost URL to http");
        }

        Ok(url)
    }

    /// Location host-relative paths resolve against
    ///
    /// # Errors
    /// Returns `HttpError::InvalidUrl` if the main domain does not form a valid URL.
    pub fn page_location(&self) -> Result<Url, HttpError> {
        match &self.config.page_location {
            Some(location) => Ok(location.clone()),
            None => parse(&format!("{DEFAULT_PROTOCOL}://www.{}/", self.config.domains.main)),
        }
    }

    /// Host is the main API domain or one of its sub-domains
    #[must_use]
    pub fn is_main_host(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host_matches(host, &self.config.domains.main))
    }

    fn is_cdn_target(&self, path: &str) -> bool {
        let host = host_of(path);
        !host.is_empty() && host_matches(host, &self.config.domains.cdn)
    }

    fn resolve(&self, path: &str) -> Result<Url, HttpError> {
        if path.starts_with('/') {
            let base = self.page_location()?;
            return base.join(path).map_err(|e| parse_error(path, e));
        }

        // An absolute URL resolved against any base is itself
        if self.config.is_dev
            && !path.starts_with("localhost:")
            && let Ok(url) = Url::parse(path)
        {
            return ensure_host(url, path);
        }

        parse(&format!("{DEFAULT_PROTOCOL}://{}", strip_scheme(path)))
    }
}

/// CDN targets are only qualified, never rewritten
fn qualify_cdn(path: &str) -> Result<Url, HttpError> {
    if let Ok(url) = Url::parse(path)
        && matches!(url.scheme(), "http" | "https")
    {
        return Ok(url);
    }
    parse(&format!("{DEFAULT_PROTOCOL}://{}", strip_scheme(path)))
}

/// Remove a leading `scheme://`, if any
fn strip_scheme(path: &str) -> &str {
    match path.find("://") {
        Some(idx)
            if path[..idx]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            &path[idx + 3..]
        }
        _ => path,
    }
}

/// Host portion of an absolute or bare `host/path` target, port and userinfo removed
fn host_of(path: &str) -> &str {
    let rest = strip_scheme(path);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    host_port.split(':').next().unwrap_or_default()
}

fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let domain = domain.to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn parse(candidate: &str) -> Result<Url, HttpError> {
    let url = Url::parse(candidate).map_err(|e| parse_error(candidate, e))?;
    ensure_host(url, candidate)
}

fn ensure_host(url: Url, original: &str) -> Result<Url, HttpError> {
    if url.host_str().is_none_or(str::is_empty) {
        return Err(HttpError::InvalidUrl {
            url: original.to_owned(),
            kind: InvalidUrlKind::MissingAuthority,
            reason: "URL has no host".to_owned(),
        });
    }
    Ok(url)
}

fn parse_error(url: &str, err: url::ParseError) -> HttpError {
    HttpError::InvalidUrl {
        url: url.to_owned(),
        kind: InvalidUrlKind::ParseError,
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn build(config: &ClientConfig, path: &str) -> String {
        UrlBuilder::new(config)
            .build(&UrlTarget {
                path,
                ..UrlTarget::default()
            })
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("https://a.test/x"), "a.test/x");
        assert_eq!(strip_scheme("a.test/x"), "a.test/x");
        assert_eq!(strip_scheme("a.test/?next=https://b.test"), "a.test/?next=https://b.test");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://user@t0.rbxcdn.com:8443/a"), "t0.rbxcdn.com");
        assert_eq!(host_of("t0.rbxcdn.com/a?b=c"), "t0.rbxcdn.com");
        assert_eq!(host_of("/v1/users"), "");
    }

    #[test]
    fn test_cdn_target_without_scheme_defaults_to_https() {
        let mut config = ClientConfig::default();
        config.tracking_search_param = Some("_t".to_owned());

        let url = build(&config, "t7.rbxcdn.com/abc/Image/Png");
        assert_eq!(url, "https://t7.rbxcdn.com/abc/Image/Png");
    }

    #[test]
    fn test_cdn_target_absolute_is_kept_verbatim() {
        let config = ClientConfig::default();
        let url = UrlBuilder::new(&config)
            .build(&UrlTarget {
                path: "http://rbxcdn.com/asset?id=1",
                query: &[("extra".to_owned(), Some("1".to_owned()))],
                ..UrlTarget::default()
            })
            .unwrap();
        assert_eq!(url.as_str(), "http://rbxcdn.com/asset?id=1");
    }

    #[test]
    fn test_host_relative_path_uses_page_location() {
        let config = ClientConfig::default();
        assert_eq!(
            build(&config, "/v1/users"),
            "https://www.roblox.com/v1/users"
        );

        let mut config = ClientConfig::default();
        config.page_location = Some(Url::parse("https://web.roblox.com/home").unwrap());
        assert_eq!(
            build(&config, "/v1/users"),
            "https://web.roblox.com/v1/users"
        );
    }

    #[test]
    fn test_bare_host_gets_default_protocol() {
        let config = ClientConfig::default();
        assert_eq!(
            build(&config, "users.roblox.com/v1/users/1"),
            "https://users.roblox.com/v1/users/1"
        );
    }

    #[test]
    fn test_absolute_url_forced_to_https_outside_dev() {
        let config = ClientConfig::default();
        assert_eq!(
            build(&config, "http://users.roblox.com/v1"),
            "https://users.roblox.com/v1"
        );
    }

    #[test]
    fn test_dev_mode_keeps_absolute_url() {
        let config = ClientConfig::for_testing();
        assert_eq!(
            build(&config, "http://127.0.0.1:4000/v1/x"),
            "http://127.0.0.1:4000/v1/x"
        );
    }

    #[test]
    fn test_dev_mode_localhost_is_always_http() {
        let config = ClientConfig::for_testing();
        assert_eq!(
            build(&config, "https://localhost:3000/api"),
            "http://localhost:3000/api"
        );
        assert_eq!(build(&config, "localhost:3000/api"), "http://localhost:3000/api");
    }

    #[test]
    fn test_localhost_untouched_outside_dev() {
        let config = ClientConfig::default();
        assert_eq!(
            build(&config, "localhost:3000/api"),
            "https://localhost:3000/api"
        );
    }

    #[test]
    fn test_query_filtering_and_multi_values() {
        let config = ClientConfig::default();
        let query = vec![
            ("ids".to_owned(), Some("1".to_owned())),
            ("skip".to_owned(), None),
            ("ids".to_owned(), Some("2".to_owned())),
        ];
        let url = UrlBuilder::new(&config)
            .build(&UrlTarget {
                path: "/v1/users",
                query: &query,
                ..UrlTarget::default()
            })
            .unwrap();
        assert_eq!(url.query(), Some("ids=1&ids=2"));
    }

    #[test]
    fn test_account_token_and_tracking_params() {
        let mut config = ClientConfig::default();
        config.account_token_search_param = Some("_acct".to_owned());
        config.tracking_search_param = Some("_t".to_owned());
        let builder = UrlBuilder::new(&config);

        let url = builder
            .build(&UrlTarget {
                path: "/v1/a",
                account_token: Some("alt"),
                ..UrlTarget::default()
            })
            .unwrap();
        assert_eq!(url.query(), Some("_acct=alt&_t="));

        let url = builder
            .build(&UrlTarget {
                path: "/v1/a",
                device_override: Some("xbox"),
                ..UrlTarget::default()
            })
            .unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_is_main_host() {
        let config = ClientConfig::default();
        let builder = UrlBuilder::new(&config);
        assert!(builder.is_main_host(&Url::parse("https://roblox.com/").unwrap()));
        assert!(builder.is_main_host(&Url::parse("https://users.roblox.com/").unwrap()));
        assert!(!builder.is_main_host(&Url::parse("https://notroblox.com/").unwrap()));
        assert!(!builder.is_main_host(&Url::parse("https://example.com/").unwrap()));
    }

    #[test]
    fn test_invalid_target_is_reported() {
        let config = ClientConfig::default();
        let err = UrlBuilder::new(&config)
            .build(&UrlTarget {
                path: "",
                ..UrlTarget::default()
            })
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidUrl { .. }));
    }
}
