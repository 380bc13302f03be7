//! Line-oriented keyword files.

use std::path::Path;

use tracing::debug;

use crate::error::{KeywordError, KeywordResult};

/// Parses one keyword per line, trimming whitespace and skipping blank lines.
pub fn parse_keywords(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Reads a keyword file from disk. See [`parse_keywords`].
pub fn load_keywords(path: impl AsRef<Path>) -> KeywordResult<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| KeywordError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let keywords = parse_keywords(&content);
    debug!(path = %path.display(), count = keywords.len(), "keyword file loaded");
    Ok(keywords)
}
