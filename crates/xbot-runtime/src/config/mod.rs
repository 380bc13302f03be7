//! Configuration for the xbot runtime.
//!
//! [`ConfigLoader`] layers built-in defaults, the `xbot` file (with its
//! profile variant underneath), `XBOT_` environment variables and
//! programmatic overrides; [`validate_config`] then checks what serde
//! cannot.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config};
pub use schema::{
    BotConfig, LimiterConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanMode, XbotConfig,
};
pub use validation::validate_config;
