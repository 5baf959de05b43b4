use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured validation/build error returned by the SDK.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}: {}", field, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ValidationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Non-2xx reply from the Ark API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct APIError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
    /// Raw response body for debugging (when available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
}

impl APIError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            request_id: None,
            raw_body: None,
        }
    }
}

impl fmt::Display for APIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = &self.code {
            write!(f, "{} ({}): {}", code, self.status, self.message)
        } else {
            write!(f, "{}: {}", self.status, self.message)
        }
    }
}

impl std::error::Error for APIError {}

/// Convenience alias for fallible SDK results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport-level error (timeouts, DNS/TLS/connectivity).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

/// Broad transport error kinds for classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{label}")
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        TransportError {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Unified error type surfaced by the SDK.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Api(#[from] APIError),

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("response contained no media data")]
    EmptyResponse,

    #[error("task creation response did not include a task id")]
    MissingTaskId,

    #[error("no media data could be read from the input file")]
    NoMediaData,

    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("task {task_id} failed: {message}")]
    RemoteTaskFailed { task_id: String, message: String },

    #[error("task {task_id} was canceled")]
    RemoteTaskCanceled { task_id: String },

    #[error("task {task_id} still pending after {attempts} status checks")]
    PollTimeout { task_id: String, attempts: u32 },

    #[error("polling of task {task_id} aborted after {attempts} status checks")]
    PollAborted { task_id: String, attempts: u32 },

    #[error("credential validation failed: {0}")]
    CredentialValidation(String),
}

impl Error {
    /// True for non-2xx replies and network failures.
    pub fn is_remote_request(&self) -> bool {
        matches!(self, Error::Api(_) | Error::Transport(_))
    }

    /// HTTP status of a non-2xx reply, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(api) => Some(api.status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_formats_with_field() {
        let err = ValidationError::new("is required").with_field("prompt");
        assert_eq!(err.to_string(), "prompt: is required");
    }

    #[test]
    fn api_error_keeps_status_and_body() {
        let api_err = APIError {
            status: 429,
            code: Some("RateLimitExceeded".into()),
            message: "too many requests".into(),
            request_id: Some("req_123".into()),
            raw_body: Some("{\"error\":\"rate limit\"}".into()),
        };

        assert_eq!(
            api_err.to_string(),
            "RateLimitExceeded (429): too many requests"
        );
        let err = Error::from(api_err);
        assert!(err.is_remote_request());
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn task_outcome_errors_are_not_remote_request_errors() {
        let err = Error::RemoteTaskFailed {
            task_id: "t1".into(),
            message: "quota exceeded".into(),
        };
        assert!(!err.is_remote_request());
        assert_eq!(err.to_string(), "task t1 failed: quota exceeded");
    }
}
