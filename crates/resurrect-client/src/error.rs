//! Error types for the control-API client.

use http::StatusCode;
use thiserror::Error;

/// Result type alias for control-API calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to the proxy daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, reset, or the request missed its deadline.
    #[error("daemon unreachable: {0}")]
    Unreachable(String),

    /// The daemon answered `GET /` but is not the daemon we expect.
    #[error("unexpected root response: expected hello={expected:?}, got {actual}")]
    Unexpected { expected: String, actual: String },

    #[error("malformed response from {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("daemon rejected {path} with {status}: {body}")]
    Rejected {
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Unreachable(_))
    }
}
