//! Outgoing header assembly and the request-signing seam

use crate::config::ClientConfig;
use crate::error::HttpError;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

/// What a [`RequestSigner`] gets to see of the outgoing request
#[derive(Debug, Clone, Copy)]
pub struct SignContext<'a> {
    pub url: &'a Url,
    pub method: &'a Method,
    /// Explicit credentials flag of the request
    pub credentials: Option<bool>,
    /// Encoded payload, if the request has a body
    pub body: Option<&'a Bytes>,
}

/// Supplies extra headers for each attempt (device binding, request signatures)
///
/// Called once per dispatched attempt, retries included. Returned headers
/// replace same-named headers already on the request, except `content-type`.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// Produce headers for this request.
    ///
    /// # Errors
    /// Any error aborts the request with `HttpError::Signer`.
    async fn sign(
        &self,
        request: SignContext<'_>,
    ) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>>;
}

/// Build the final header set of one attempt
///
/// Order: caller headers, device/tracking user agent, signer output, content type.
pub(crate) async fn assemble_headers(
    config: &ClientConfig,
    signer: Option<&dyn RequestSigner>,
    caller: &HeaderMap,
    device_override: Option<&str>,
    sign: SignContext<'_>,
    content_type: Option<&str>,
) -> Result<HeaderMap, HttpError> {
    let mut headers = caller.clone();

    if let Some(tag) = device_override {
        if let Some(header_name) = config.override_device_type_header_name.as_deref() {
            headers.insert(
                HeaderName::from_bytes(header_name.as_bytes())?,
                HeaderValue::from_str(tag)?,
            );
        } else if let Some(user_agent) = config.override_device_type_to_user_agent.get(tag) {
            headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        } else {
            tracing::warn!(device = tag, "no user agent configured for device override");
        }
    } else if let Some(user_agent) = config.tracking_user_agent.as_deref()
        && config.tracking_search_param.is_none()
    {
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
    }

    if let Some(signer) = signer {
        let signed = signer.sign(sign).await.map_err(HttpError::Signer)?;
        merge_overwriting(&mut headers, signed);
    }

    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
    }

    Ok(headers)
}

/// Merge `other` into `headers`; every name present in `other` replaces existing values
fn merge_overwriting(headers: &mut HeaderMap, other: HeaderMap) {
    let mut current: Option<HeaderName> = None;
    for (name, value) in other {
        match name {
            Some(name) => {
                headers.insert(name.clone(), value);
                current = Some(name);
            }
            None => {
                if let Some(name) = &current {
                    headers.append(name, value);
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    struct StaticSigner(HeaderMap);

    #[async_trait]
    impl RequestSigner for StaticSigner {
        async fn sign(
            &self,
            _request: SignContext<'_>,
        ) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSigner;

    #[async_trait]
    impl RequestSigner for FailingSigner {
        async fn sign(
            &self,
            _request: SignContext<'_>,
        ) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>> {
            Err("no key".into())
        }
    }

    async fn assemble(
        config: &ClientConfig,
        signer: Option<&dyn RequestSigner>,
        caller: &HeaderMap,
        device_override: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<HeaderMap, HttpError> {
        let url = Url::parse("https://auth.roblox.com/v2/login").unwrap();
        let ctx = SignContext {
            url: &url,
            method: &Method::POST,
            credentials: Some(true),
            body: None,
        };
        assemble_headers(config, signer, caller, device_override, ctx, content_type).await
    }

    #[tokio::test]
    async fn test_device_override_header_name_wins() {
        let mut config = ClientConfig::default();
        config.override_device_type_header_name = Some("x-device-type".to_owned());
        config
            .override_device_type_to_user_agent
            .insert("xbox".to_owned(), "Roblox/XboxOne".to_owned());

        let headers = assemble(&config, None, &HeaderMap::new(), Some("xbox"), None)
            .await
            .unwrap();
        assert_eq!(headers["x-device-type"], "xbox");
        assert!(!headers.contains_key(USER_AGENT));
    }

    #[tokio::test]
    async fn test_device_override_maps_user_agent() {
        let mut config = ClientConfig::default();
        config
            .override_device_type_to_user_agent
            .insert("xbox".to_owned(), "Roblox/XboxOne".to_owned());
        config.tracking_user_agent = Some("Tracker/1".to_owned());

        let headers = assemble(&config, None, &HeaderMap::new(), Some("xbox"), None)
            .await
            .unwrap();
        assert_eq!(headers[USER_AGENT], "Roblox/XboxOne");
    }

    #[tokio::test]
    async fn test_tracking_user_agent_only_without_search_param() {
        let mut config = ClientConfig::default();
        config.tracking_user_agent = Some("Tracker/1".to_owned());

        let headers = assemble(&config, None, &HeaderMap::new(), None, None)
            .await
            .unwrap();
        assert_eq!(headers[USER_AGENT], "Tracker/1");

        config.tracking_search_param = Some("_t".to_owned());
        let headers = assemble(&config, None, &HeaderMap::new(), None, None)
            .await
            .unwrap();
        assert!(!headers.contains_key(USER_AGENT));
    }

    #[tokio::test]
    async fn test_signer_overwrites_but_content_type_wins() {
        let config = ClientConfig::default();
        let mut caller = HeaderMap::new();
        caller.insert("x-bound-auth-token", HeaderValue::from_static("old"));
        caller.insert("accept", HeaderValue::from_static("application/json"));

        let mut signed = HeaderMap::new();
        signed.insert("x-bound-auth-token", HeaderValue::from_static("new"));
        signed.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let signer = StaticSigner(signed);

        let headers = assemble(
            &config,
            Some(&signer as &dyn RequestSigner),
            &caller,
            None,
            Some("application/json"),
        )
        .await
        .unwrap();

        assert_eq!(headers["x-bound-auth-token"], "new");
        assert_eq!(headers["accept"], "application/json");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers.get_all("x-bound-auth-token").iter().count(), 1);
    }

    #[tokio::test]
    async fn test_signer_failure_is_reported() {
        let config = ClientConfig::default();
        let signer: &dyn RequestSigner = &FailingSigner;
        let result = assemble(&config, Some(signer), &HeaderMap::new(), None, None).await;
        assert!(matches!(result, Err(HttpError::Signer(_))));
    }

    #[test]
    fn test_merge_overwriting_keeps_multi_values() {
        let mut headers = HeaderMap::new();
        headers.insert("x-a", HeaderValue::from_static("1"));

        let mut other = HeaderMap::new();
        other.append("x-a", HeaderValue::from_static("2"));
        other.append("x-a", HeaderValue::from_static("3"));
        merge_overwriting(&mut headers, other);

        let values: Vec<_> = headers.get_all("x-a").iter().collect();
        assert_eq!(values, ["2", "3"]);
    }
}
