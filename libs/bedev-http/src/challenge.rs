//! Bot-challenge signalling
//!
//! A protected endpoint answers with a non-2xx status and three headers naming
//! the challenge. The caller's [`ChallengeHandler`] resolves it out of band and
//! returns the record to replay on the retried request.

use crate::error::HttpError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderMap, HeaderValue};
use serde_json::Value;

pub const CHALLENGE_TYPE_HEADER: &str = "rblx-challenge-type";
pub const CHALLENGE_ID_HEADER: &str = "rblx-challenge-id";
pub const CHALLENGE_METADATA_HEADER: &str = "rblx-challenge-metadata";

/// A challenge issued by the server, or its solution sent back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRecord {
    pub challenge_type: String,
    pub id: String,
    /// Base64-encoded JSON
    pub metadata: String,
}

impl ChallengeRecord {
    #[must_use]
    pub fn new(
        challenge_type: impl Into<String>,
        id: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            challenge_type: challenge_type.into(),
            id: id.into(),
            metadata: metadata.into(),
        }
    }

    /// Record whose metadata is `value` encoded as base64 JSON
    #[must_use]
    pub fn with_json_metadata(
        challenge_type: impl Into<String>,
        id: impl Into<String>,
        value: &Value,
    ) -> Self {
        Self::new(challenge_type, id, STANDARD.encode(value.to_string()))
    }

    /// Metadata decoded from base64 JSON; `None` if it is not valid
    #[must_use]
    pub fn decoded_metadata(&self) -> Option<Value> {
        let raw = STANDARD.decode(self.metadata.trim()).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Write the three challenge headers, replacing existing values
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if a field is not a valid header value.
    pub fn apply_to(&self, headers: &mut HeaderMap) -> Result<(), HttpError> {
        headers.insert(
            CHALLENGE_TYPE_HEADER,
            HeaderValue::from_str(&self.challenge_type)?,
        );
        headers.insert(CHALLENGE_ID_HEADER, HeaderValue::from_str(&self.id)?);
        headers.insert(
            CHALLENGE_METADATA_HEADER,
            HeaderValue::from_str(&self.metadata)?,
        );
        Ok(())
    }
}

/// Extracts a challenge from response headers
pub trait ChallengeParser: Send + Sync {
    fn parse(&self, headers: &HeaderMap) -> Option<ChallengeRecord>;
}

/// Reads the three `rblx-challenge-*` headers; all must be present
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderChallengeParser;

impl ChallengeParser for HeaderChallengeParser {
    fn parse(&self, headers: &HeaderMap) -> Option<ChallengeRecord> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        Some(ChallengeRecord::new(
            read(CHALLENGE_TYPE_HEADER)?,
            read(CHALLENGE_ID_HEADER)?,
            read(CHALLENGE_METADATA_HEADER)?,
        ))
    }
}

/// Resolves a challenge for one request
///
/// Returning `Ok(None)` gives up: the failed response is then handled like any
/// other error.
#[async_trait]
pub trait ChallengeHandler: Send + Sync {
    /// Solve `challenge`.
    ///
    /// # Errors
    /// Any error aborts the request with `HttpError::ChallengeHandler`.
    async fn handle(
        &self,
        challenge: ChallengeRecord,
    ) -> Result<Option<ChallengeRecord>, Box<dyn std::error::Error + Send + Sync>>;
}
