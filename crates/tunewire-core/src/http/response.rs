//! Fully-read HTTP responses

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// An HTTP response whose body has been read completely
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RawResponse {
    /// Build a response. Statuses that never carry an entity
    /// (1xx, 204, 304) drop the body.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let has_entity = !(status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED);
        Self {
            status,
            headers,
            body: has_entity.then_some(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Reason phrase for the status line
    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Body decoded as UTF-8, `None` when the response has no entity.
    /// Invalid sequences become U+FFFD.
    pub fn text(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Decode a JSON response body
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::ResponseParse {
        message: format!("invalid JSON body: {}", e),
        source: Some(e.into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_no_entity_statuses() {
        let no_content = RawResponse::new(StatusCode::NO_CONTENT, HeaderMap::new(), Bytes::new());
        assert!(no_content.body().is_none());
        assert_eq!(no_content.text(), None);

        let ok = RawResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new());
        assert_eq!(ok.text(), Some(String::new()));
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let response = RawResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::from_static(b"caf\xe9"));
        assert_eq!(response.text().as_deref(), Some("caf\u{fffd}"));
    }

    #[test]
    fn test_reason_phrase() {
        let response = RawResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), Bytes::new());
        assert_eq!(response.reason(), "Not Found");
    }

    #[test]
    fn test_parse_body() {
        let value: Value = parse_body(r#"{"total":42}"#).unwrap();
        assert_eq!(value["total"], 42);
        assert!(matches!(
            parse_body::<Value>("{not json"),
            Err(Error::ResponseParse { .. })
        ));
    }
}
