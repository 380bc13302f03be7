//! Error types for outbound API calls.

use thiserror::Error;

/// Errors returned by [`Bot`](crate::Bot) API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The bot is not connected.
    #[error("bot is not connected")]
    NotConnected,

    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,

    /// The gateway answered with a failure.
    #[error("API error ({retcode}): {message}")]
    Failed { retcode: i64, message: String },

    /// Failed to serialize parameters or decode the response.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The event does not carry what the call needs.
    #[error("missing session info: {0}")]
    MissingSession(String),

    #[error("{0}")]
    Other(String),
}

impl ApiError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
