//! Request body encoding

use crate::error::HttpError;
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// One named part of a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub value: Bytes,
    /// Present for file parts
    pub filename: Option<String>,
}

impl FormPart {
    /// Plain text field
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: Bytes::from(value.into()),
            filename: None,
        }
    }

    /// File field
    #[must_use]
    pub fn file(value: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            filename: Some(filename.into()),
        }
    }
}

/// Tagged request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Compact JSON, `application/json`
    Json(Value),
    /// JSON whose integers may exceed 64 bits; encoded without precision loss
    JsonBigInt(Value),
    /// Sent as-is, no content type
    Text(String),
    /// `multipart/form-data`; a repeated name replaces the earlier part
    FormData(Vec<(String, FormPart)>),
    /// Raw file contents, no content type
    File(Bytes),
    /// `application/x-www-form-urlencoded`
    UrlEncoded(Vec<(String, String)>),
    /// Opaque bytes passed through unchanged
    Raw(Bytes),
}

impl RequestBody {
    /// JSON body from any serializable value
    ///
    /// # Errors
    /// Returns `HttpError::Json` if the value cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, HttpError> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Big-integer JSON body parsed from text, keeping every digit of every number
    ///
    /// # Errors
    /// Returns `HttpError::Json` if `text` is not valid JSON.
    pub fn json_big_int(text: &str) -> Result<Self, HttpError> {
        Ok(Self::JsonBigInt(serde_json::from_str(text)?))
    }

    /// Encode into a transport payload and optional content type.
    ///
    /// # Errors
    /// Returns `HttpError::Json` or `HttpError::FormEncode` on serialization failure.
    pub fn encode(&self) -> Result<EncodedBody, HttpError> {
        let encoded = match self {
            Self::Json(value) | Self::JsonBigInt(value) => EncodedBody {
                payload: Bytes::from(serde_json::to_vec(value)?),
                content_type: Some(APPLICATION_JSON.to_owned()),
            },
            Self::Text(text) => EncodedBody {
                payload: Bytes::from(text.clone()),
                content_type: None,
            },
            Self::FormData(parts) => encode_multipart(parts, &random_boundary()),
            Self::UrlEncoded(pairs) => EncodedBody {
                payload: Bytes::from(serde_urlencoded::to_string(pairs)?),
                content_type: Some(APPLICATION_FORM_URLENCODED.to_owned()),
            },
            Self::File(bytes) | Self::Raw(bytes) => EncodedBody {
                payload: bytes.clone(),
                content_type: None,
            },
        };
        Ok(encoded)
    }
}

/// Transport-ready payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub payload: Bytes,
    pub content_type: Option<String>,
}

fn random_boundary() -> String {
    let suffix: String = rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("----BedevFormBoundary{suffix}")
}

/// Quote-safe field name or filename
fn escape_field(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn encode_multipart(parts: &[(String, FormPart)], boundary: &str) -> EncodedBody {
    // Later duplicates overwrite in place
    let mut unique: Vec<(&str, &FormPart)> = Vec::with_capacity(parts.len());
    for (name, part) in parts {
        match unique.iter_mut().find(|(existing, _)| *existing == name.as_str()) {
            Some(slot) => slot.1 = part,
            None => unique.push((name.as_str(), part)),
        }
    }

    let mut out = BytesMut::new();
    for (name, part) in unique {
        out.put_slice(format!("--{boundary}\r\n").as_bytes());
        match &part.filename {
            Some(filename) => {
                out.put_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        escape_field(name),
                        escape_field(filename)
                    )
                    .as_bytes(),
                );
                out.put_slice(format!("Content-Type: {APPLICATION_OCTET_STREAM}\r\n").as_bytes());
            }
            None => {
                out.put_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n",
                        escape_field(name)
                    )
                    .as_bytes(),
                );
            }
        }
        out.put_slice(b"\r\n");
        out.put_slice(&part.value);
        out.put_slice(b"\r\n");
    }
    out.put_slice(format!("--{boundary}--\r\n").as_bytes());

    EncodedBody {
        payload: out.freeze(),
        content_type: Some(format!("multipart/form-data; boundary={boundary}")),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body_roundtrips() {
        let value = json!({"name": "builderman", "ids": [1, 2, 3], "nested": {"ok": true}});
        let encoded = RequestBody::Json(value.clone()).encode().unwrap();

        assert_eq!(encoded.content_type.as_deref(), Some(APPLICATION_JSON));
        let decoded: Value = serde_json::from_slice(&encoded.payload).unwrap();
        assert_eq!(decoded, value);
        assert!(!encoded.payload.contains(&b'\n'));
    }

    #[test]
    fn test_json_big_int_keeps_precision() {
        let text = r#"{"small":9007199254740993,"targetId":123456789012345678901234567890}"#;
        let encoded = RequestBody::json_big_int(text).unwrap().encode().unwrap();

        assert_eq!(encoded.content_type.as_deref(), Some(APPLICATION_JSON));
        assert_eq!(encoded.payload, Bytes::from(text));
    }

    #[test]
    fn test_text_and_raw_have_no_content_type() {
        let text = RequestBody::Text("hello".to_owned()).encode().unwrap();
        assert_eq!(text.payload, Bytes::from("hello"));
        assert!(text.content_type.is_none());

        let raw = RequestBody::Raw(Bytes::from_static(b"\x00\x01")).encode().unwrap();
        assert_eq!(raw.payload, Bytes::from_static(b"\x00\x01"));
        assert!(raw.content_type.is_none());

        let file = RequestBody::File(Bytes::from_static(b"PNG")).encode().unwrap();
        assert!(file.content_type.is_none());
    }

    #[test]
    fn test_url_encoded() {
        let body = RequestBody::UrlEncoded(vec![
            ("username".to_owned(), "a b".to_owned()),
            ("next".to_owned(), "/home?x=1".to_owned()),
        ]);
        let encoded = body.encode().unwrap();
        assert_eq!(
            encoded.content_type.as_deref(),
            Some(APPLICATION_FORM_URLENCODED)
        );
        assert_eq!(encoded.payload, Bytes::from("username=a+b&next=%2Fhome%3Fx%3D1"));
    }

    #[test]
    fn test_multipart_overwrites_duplicates_and_emits_filename() {
        let parts = vec![
            ("name".to_owned(), FormPart::text("first")),
            ("file".to_owned(), FormPart::file(Bytes::from_static(b"DATA"), "a.png")),
            ("name".to_owned(), FormPart::text("second")),
        ];
        let encoded = encode_multipart(&parts, "XYZ");

        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"name\"\r\n\
            \r\n\
            second\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\
            Content-Type: application/octet-stream\r\n\
            \r\n\
            DATA\r\n\
            --XYZ--\r\n";
        assert_eq!(encoded.payload, Bytes::from(expected));
        assert_eq!(
            encoded.content_type.as_deref(),
            Some("multipart/form-data; boundary=XYZ")
        );
    }

    #[test]
    fn test_form_data_uses_random_boundary() {
        let body = RequestBody::FormData(vec![("a".to_owned(), FormPart::text("1"))]);
        let first = body.encode().unwrap();
        let second = body.encode().unwrap();

        let ct = first.content_type.unwrap();
        assert!(ct.starts_with("multipart/form-data; boundary=----BedevFormBoundary"));
        assert_ne!(Some(ct), second.content_type);
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("a\"b\r\nc"), "a%22b%0D%0Ac");
    }
}
