//! Errors raised while loading or validating configuration.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A file passed to [`ConfigLoader::file`](super::ConfigLoader::file)
    /// does not exist.
    #[error("config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// The extension belongs to no format compiled into this build.
    #[error("config file {} has no enabled format (see the `toml-config` and `yaml-config` features)", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A source could not be read or does not fit the schema.
    #[error(transparent)]
    Extract(Box<figment::Error>),

    /// A value that parses but cannot be used.
    #[error("invalid `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending key, when known.
    pub fn key(&self) -> Option<String> {
        match self {
            Self::Invalid { key, .. } => Some((*key).to_string()),
            Self::Extract(err) => (!err.path.is_empty()).then(|| err.path.join(".")),
            Self::FileNotFound(_) | Self::UnsupportedFormat(_) => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Extract(Box::new(err))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
