//! Error types for tally-ai

use thiserror::Error;

/// Result type alias using tally-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the assistant API
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned a structured error payload
    #[error("API error: {message} (code: {code})")]
    Api { code: i64, message: String },

    /// Failure already reported by the shared response interceptor
    #[error("Request failed (status {status}): {message}")]
    Processed { status: u16, message: String },

    /// Request was aborted through its cancellation handle
    #[error("Request aborted")]
    Aborted,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Request rejected before it was sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Create an API error from a code and message
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Check if this error came from cancellation
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// The server-provided message, if the failure carried one
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Error::Api { message, .. } if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }
}
