//! Error types shared across the storage and upstream layers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest slice of an upstream body kept in error messages.
pub const BODY_SNIPPET_LEN: usize = 200;

/// Failure of a single outbound HTTP call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    /// Upstream answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// 2xx response whose body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl CallError {
    pub fn http(status: u16, body: &str) -> Self {
        Self::Http {
            status,
            body: snippet(body),
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Truncate on a char boundary.
pub fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

/// Why a check-in run did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No stored token or session.
    MissingCredential,
    /// Upstream answered with a non-200 status.
    HttpError(u16),
    /// 2xx but the body reported failure.
    ApiRejected,
    /// Network or parse failure.
    TransportException,
    /// Lottery succeeded without yielding a code.
    MissingArtifact,
}

impl From<&CallError> for FailureKind {
    fn from(e: &CallError) -> Self {
        match e {
            CallError::Http { status, .. } => FailureKind::HttpError(*status),
            CallError::Transport(_) | CallError::Decode(_) => FailureKind::TransportException,
        }
    }
}

/// Storage-layer failures (credential file, SQLite).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("invalid input: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_truncates_body() {
        let body = "x".repeat(500);
        match CallError::http(502, &body) {
            CallError::Http { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), BODY_SNIPPET_LEN);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let body = "签到".repeat(150);
        assert_eq!(snippet(&body).chars().count(), BODY_SNIPPET_LEN);
    }

    #[test]
    fn test_failure_kind_from_call_error() {
        assert_eq!(
            FailureKind::from(&CallError::http(500, "")),
            FailureKind::HttpError(500)
        );
        assert_eq!(
            FailureKind::from(&CallError::Decode("eof".into())),
            FailureKind::TransportException
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::MissingArtifact).unwrap(),
            "\"missing_artifact\""
        );
        assert_eq!(
            serde_json::to_value(FailureKind::HttpError(503)).unwrap(),
            serde_json::json!({"http_error": 503})
        );
    }
}
