//! Error types for the xbot framework.

use thiserror::Error;
use xbot_keyword::KeywordError;

/// Errors raised by rate limiter backends.
#[derive(Debug, Clone, Error)]
pub enum LimiterError {
    /// The backing store could not be reached or answered with an error.
    #[error("limiter store error: {0}")]
    Store(String),
}

impl LimiterError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

/// Errors raised inside middleware chains.
#[derive(Debug, Clone, Error)]
pub enum MiddlewareError {
    /// A `from_fn` middleware service was called more than once.
    #[error("middleware continuation was already consumed")]
    NextConsumed,
}

/// Framework-level errors.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(transparent)]
    Keyword(#[from] KeywordError),

    /// `reload` was called on a sensitive-word filter that has no backing file.
    #[error("sensitive word filter has no source file to reload from")]
    NoSource,

    /// File watching was started outside a Tokio runtime.
    #[error("watching a word file requires a running tokio runtime")]
    NoRuntime,

    #[error("watch interval must be greater than zero")]
    ZeroInterval,
}

/// Result type for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;
