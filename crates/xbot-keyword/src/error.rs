//! Keyword loading errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading keyword lists.
#[derive(Error, Debug)]
pub enum KeywordError {
    /// The keyword file could not be read.
    #[error("Failed to read keyword file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for keyword loading.
pub type KeywordResult<T> = Result<T, KeywordError>;
