use reqwest::{header::HeaderMap, StatusCode};

use crate::errors::{APIError, Error};

/// Header carrying the request id on Ark replies.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Fallback log id header set by the Volcengine gateway.
const LOG_ID_HEADER: &str = "X-Tt-Logid";

/// Structured header list with validation.
#[derive(Clone, Debug, Default)]
pub struct HeaderList(Vec<HeaderEntry>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a header entry.
    ///
    /// # Panics
    /// Panics if the header key or value is empty or contains only whitespace.
    pub fn push(&mut self, entry: HeaderEntry) {
        assert!(
            entry.is_valid(),
            "Invalid header: key and value must be non-empty (got key={:?}, value={:?})",
            entry.key,
            entry.value
        );
        self.0.push(entry);
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(HeaderEntry::new(key.into(), value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: String, value: String) -> Self {
        Self { key, value }
    }

    pub fn is_valid(&self) -> bool {
        !(self.key.trim().is_empty() || self.value.trim().is_empty())
    }
}

pub(crate) fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    [REQUEST_ID_HEADER, LOG_ID_HEADER]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Builds an [`APIError`] from a non-2xx reply.
///
/// Ark wraps failures as `{"error":{"code":"...","message":"..."}}`; bodies that
/// do not match keep the raw text as the message.
pub(crate) fn parse_api_error_parts(
    status: StatusCode,
    headers: &HeaderMap,
    body: String,
) -> Error {
    let request_id = request_id_from_headers(headers);
    let status_code = status.as_u16();
    let status_text = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();

    if body.trim().is_empty() {
        return APIError {
            status: status_code,
            code: None,
            message: status_text,
            request_id,
            raw_body: None,
        }
        .into();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
        let envelope = value
            .get("error")
            .and_then(|v| v.as_object())
            .or_else(|| value.as_object());
        if let Some(obj) = envelope {
            if let Some(message) = obj.get("message").and_then(|v| v.as_str()) {
                let code = obj
                    .get("code")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let request_id = value
                    .get("request_id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .or(request_id);
                return APIError {
                    status: status_code,
                    code,
                    message: message.to_string(),
                    request_id,
                    raw_body: Some(body),
                }
                .into();
            }
        }
    }

    APIError {
        status: status_code,
        code: None,
        message: body.clone(),
        request_id,
        raw_body: Some(body),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn api(err: Error) -> APIError {
        match err {
            Error::Api(api) => api,
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn parses_ark_error_envelope() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-9"));
        let body = r#"{"error":{"code":"InvalidParameter","message":"size is invalid"}}"#;
        let err = api(parse_api_error_parts(
            StatusCode::BAD_REQUEST,
            &headers,
            body.to_string(),
        ));
        assert_eq!(err.status, 400);
        assert_eq!(err.code.as_deref(), Some("InvalidParameter"));
        assert_eq!(err.message, "size is invalid");
        assert_eq!(err.request_id.as_deref(), Some("req-9"));
        assert_eq!(err.raw_body.as_deref(), Some(body));
    }

    #[test]
    fn plain_text_body_becomes_message() {
        let err = api(parse_api_error_parts(
            StatusCode::BAD_GATEWAY,
            &HeaderMap::new(),
            "upstream down".to_string(),
        ));
        assert_eq!(err.status, 502);
        assert_eq!(err.message, "upstream down");
        assert_eq!(err.raw_body.as_deref(), Some("upstream down"));
    }

    #[test]
    fn empty_body_uses_reason_phrase() {
        let mut headers = HeaderMap::new();
        headers.insert(LOG_ID_HEADER, HeaderValue::from_static("log-1"));
        let err = api(parse_api_error_parts(
            StatusCode::NOT_FOUND,
            &headers,
            String::new(),
        ));
        assert_eq!(err.message, "Not Found");
        assert_eq!(err.request_id.as_deref(), Some("log-1"));
        assert!(err.raw_body.is_none());
    }

    #[test]
    #[should_panic(expected = "Invalid header")]
    fn header_list_panics_on_whitespace_only() {
        let mut list = HeaderList::new();
        list.push(HeaderEntry::new("   ".to_string(), "value".to_string()));
    }
}
