//! Error types for tally-assistant

use thiserror::Error;

/// Result type alias using tally-assistant Error
pub type Result<T> = std::result::Result<T, Error>;

/// Generic message shown when the assistant failed for an unknown reason
pub const RESPONSE_UNAVAILABLE: &str = "Unable to get AI assistant response";

/// Errors surfaced to callers of the assistant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request was aborted through its cancellation handle
    #[error("Request canceled")]
    Canceled,

    /// The server explained what went wrong
    #[error("{0}")]
    ServerMessage(String),

    /// Already reported upstream; callers should not report it again
    #[error("{0}")]
    AlreadyProcessed(String),

    /// Anything else
    #[error("{}", RESPONSE_UNAVAILABLE)]
    Unknown,

    /// Another request is still in flight
    #[error("A request is already in progress")]
    Busy,

    /// The assistant feature is turned off
    #[error("AI assistant is not enabled")]
    Disabled,

    /// Nothing to send
    #[error("Message is empty")]
    EmptyMessage,
}

impl Error {
    /// Whether the user asked for this
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// Text to show the user, or `None` when nothing should be shown
    pub fn user_message(&self) -> Option<String> {
        match self {
            Error::Canceled | Error::AlreadyProcessed(_) => None,
            other => Some(other.to_string()),
        }
    }
}
