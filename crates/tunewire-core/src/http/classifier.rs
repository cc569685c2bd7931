//! Response classification
//!
//! Turns a fully-read response into either the body text or exactly one
//! typed [`Error`], based on the status code and the Web API's JSON error
//! payload.

use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use serde_json::Value;

use crate::http::response::RawResponse;
use crate::{Error, Result};

/// Status codes that the classifier turns into typed errors
pub const ERROR_STATUSES: [u16; 8] = [400, 401, 403, 404, 429, 500, 502, 503];

/// Classify a response: body text for non-error statuses, a typed error otherwise
pub fn classify(response: &RawResponse) -> Result<Option<String>> {
    let body = response.text();
    let status = response.status().as_u16();

    tracing::trace!(body = body.as_deref().unwrap_or("<none>"), "response body");
    tracing::debug!(status, "response status");

    let message = extract_error_message(body.as_deref())
        .unwrap_or_else(|| response.reason().to_string());

    match status {
        400 => Err(Error::BadRequest { message }),
        401 => Err(Error::Unauthorized { message }),
        403 => Err(Error::Forbidden { message }),
        404 => Err(Error::NotFound { message }),
        429 => Err(Error::TooManyRequests {
            message,
            retry_after: retry_after_secs(response),
        }),
        500 => Err(Error::InternalServerError { message }),
        502 => Err(Error::BadGateway { message }),
        503 => Err(Error::ServiceUnavailable { message }),
        _ => Ok(body),
    }
}

/// Pull the error message out of a Web API error payload.
///
/// Both payload shapes are recognised:
/// `{"error": "...", "error_description": "..."}` (authorization endpoints)
/// and `{"error": {"status": 404, "message": "..."}}` (regular endpoints).
/// Bodies that are not JSON objects yield `None`.
fn extract_error_message(body: Option<&str>) -> Option<String> {
    let json = serde_json::from_str::<Value>(body?).ok()?;
    let object = json.as_object()?;
    let error = object.get("error")?;

    if let Some(description) = object.get("error_description") {
        return Some(json_text(description));
    }

    error
        .as_object()
        .and_then(|error| error.get("message"))
        .map(json_text)
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `Retry-After` in seconds: delta-seconds as-is, an HTTP-date as the time
/// remaining until that date
fn retry_after_secs(response: &RawResponse) -> Option<u64> {
    let value = response.headers().get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    match DateTime::parse_from_rfc2822(value) {
        Ok(date) => {
            let remaining = date.with_timezone(&Utc) - Utc::now();
            Some(remaining.num_seconds().max(0) as u64)
        }
        Err(_) => {
            tracing::warn!(value, "ignoring unparsable Retry-After header");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::StatusCode;

    fn response(status: u16, body: &str) -> RawResponse {
        response_with_headers(status, HeaderMap::new(), body)
    }

    fn response_with_headers(status: u16, headers: HeaderMap, body: &str) -> RawResponse {
        raw(status, headers, body.as_bytes())
    }

    fn raw(status: u16, headers: HeaderMap, body: &[u8]) -> RawResponse {
        RawResponse::new(
            StatusCode::from_u16(status).unwrap(),
            headers,
            Bytes::copy_from_slice(body),
        )
    }

    #[test]
    fn test_not_found_uses_reason_phrase() {
        let err = classify(&response(404, "{}")).unwrap_err();
        assert!(matches!(err, Error::NotFound { ref message } if message == "Not Found"));
    }

    #[test]
    fn test_rate_limited_with_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));
        let err = classify(&response_with_headers(
            429,
            headers,
            r#"{"error":{"message":"rate limited"}}"#,
        ))
        .unwrap_err();

        match err {
            Error::TooManyRequests { message, retry_after } => {
                assert_eq!(message, "rate limited");
                assert_eq!(retry_after, Some(5));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rate_limited_without_retry_after() {
        let err = classify(&response(429, "")).unwrap_err();
        assert_eq!(err.retry_after(), None);
        assert_eq!(err.api_message(), Some("Too Many Requests"));
    }

    #[test]
    fn test_retry_after_http_date_in_past() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        let err = classify(&response_with_headers(429, headers, "")).unwrap_err();
        assert_eq!(err.retry_after(), Some(0));
    }

    #[test]
    fn test_retry_after_garbage_is_omitted() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        let err = classify(&response_with_headers(429, headers, "")).unwrap_err();
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_success_returns_literal_body() {
        let body = classify(&response(200, r#"{"total":42}"#)).unwrap();
        assert_eq!(body.as_deref(), Some(r#"{"total":42}"#));
    }

    #[test]
    fn test_no_content_returns_none() {
        assert_eq!(classify(&response(204, "")).unwrap(), None);
        assert_eq!(classify(&response(304, "")).unwrap(), None);
    }

    #[test]
    fn test_error_description_wins() {
        let err = classify(&response(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#,
        ))
        .unwrap_err();
        assert_eq!(err.api_message(), Some("Invalid authorization code"));
    }

    #[test]
    fn test_string_error_without_description_keeps_reason() {
        let err = classify(&response(401, r#"{"error":"invalid_client"}"#)).unwrap_err();
        assert!(matches!(err, Error::Unauthorized { ref message } if message == "Unauthorized"));
    }

    #[test]
    fn test_nested_error_message() {
        let err = classify(&response(
            403,
            r#"{"error":{"status":403,"message":"Player command failed: Restriction violated"}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
        assert_eq!(
            err.api_message(),
            Some("Player command failed: Restriction violated")
        );
    }

    #[test]
    fn test_malformed_json_keeps_reason_phrase() {
        let err = classify(&response(502, "<html>upstream down")).unwrap_err();
        assert!(matches!(err, Error::BadGateway { ref message } if message == "Bad Gateway"));

        let err = classify(&response(500, r#"{"error": "#)).unwrap_err();
        assert!(matches!(err, Error::InternalServerError { .. }));

        let err = classify(&response(503, "[1,2,3]")).unwrap_err();
        assert_eq!(err.api_message(), Some("Service Unavailable"));
    }

    #[test]
    fn test_latin1_body_still_classified() {
        let err = classify(&raw(503, HeaderMap::new(), b"<html>Servi\xe7e indisponible</html>")).unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable { ref message } if message == "Service Unavailable"));

        let body = classify(&raw(200, HeaderMap::new(), b"caf\xe9")).unwrap();
        assert_eq!(body.as_deref(), Some("caf\u{fffd}"));
    }

    #[test]
    fn test_error_payload_on_success_status_is_returned() {
        let body = r#"{"error":{"message":"odd but fine"}}"#;
        assert_eq!(classify(&response(200, body)).unwrap().as_deref(), Some(body));
    }

    proptest! {
        #[test]
        fn prop_error_statuses_never_return_body(
            index in 0usize..ERROR_STATUSES.len(),
            body in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let status = ERROR_STATUSES[index];
            let err = classify(&raw(status, HeaderMap::new(), &body)).unwrap_err();
            prop_assert_eq!(err.status_code(), Some(status));
        }

        #[test]
        fn prop_other_statuses_return_body(
            status in 200u16..600,
            body in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            prop_assume!(!ERROR_STATUSES.contains(&status));
            let result = classify(&raw(status, HeaderMap::new(), &body));
            prop_assert!(result.is_ok());
            if status != 204 && status != 304 {
                prop_assert_eq!(result.unwrap(), Some(String::from_utf8_lossy(&body).into_owned()));
            }
        }
    }
}
