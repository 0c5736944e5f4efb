//! Single-attempt dispatch: URL, body and headers in, typed response out

use crate::body::RequestBody;
use crate::client::ClientInner;
use crate::error::HttpError;
use crate::headers::{SignContext, assemble_headers};
use crate::request::RestRequest;
use crate::response::{ResponseKind, RestResponse};
use crate::transport::{Credentials, Transport, TransportRequest};
use crate::url_builder::UrlBuilder;
use http::HeaderMap;
use std::sync::Arc;

impl ClientInner {
    /// Perform exactly one attempt of `request` with the given header set
    ///
    /// Non-2xx statuses are returned as `Ok`; only building and transport
    /// failures are errors.
    pub(crate) async fn dispatch(
        &self,
        request: &Arc<RestRequest>,
        headers: &HeaderMap,
        kind: ResponseKind,
    ) -> Result<RestResponse, HttpError> {
        let url = UrlBuilder::new(&self.config).build(&request.url_target())?;
        let encoded = request.body.as_ref().map(RequestBody::encode).transpose()?;
        let payload = encoded.as_ref().map(|e| e.payload.clone());

        let sign = SignContext {
            url: &url,
            method: &request.method,
            credentials: request.credentials,
            body: payload.as_ref(),
        };
        let headers = assemble_headers(
            &self.config,
            self.signer.as_deref(),
            headers,
            request.device_override.as_deref(),
            sign,
            encoded.as_ref().and_then(|e| e.content_type.as_deref()),
        )
        .await?;

        let transport = self.select_transport(request.bypass_cors);

        tracing::debug!(
            method = %request.method,
            url = %url,
            bypass_cors = request.bypass_cors,
            "dispatching request"
        );

        let raw = transport
            .fetch(TransportRequest {
                method: request.method.clone(),
                url,
                headers,
                cache: request.cache,
                body: payload,
                credentials: Credentials::from_flag(request.credentials),
            })
            .await?;

        RestResponse::from_transport(raw, Arc::clone(request), kind, self.camelizer.as_ref())
    }

    fn select_transport(&self, bypass_cors: bool) -> &dyn Transport {
        match (&self.bypass_cors_transport, bypass_cors) {
            (Some(bypass), true) => bypass.as_ref(),
            _ => self.transport.as_ref(),
        }
    }
}
