//! xbot runtime - configuration, logging and the event loop.
//!
//! This crate provides:
//! - Layered configuration loading with figment ([`ConfigLoader`])
//! - Tracing subscriber setup driven by that configuration ([`LoggingBuilder`])
//! - [`XbotRuntime`], which owns the engines and feeds them queued events
//!   until Ctrl+C or SIGTERM
//!
//! ```ignore
//! use xbot_runtime::XbotRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = XbotRuntime::builder().build(bot)?;
//!     runtime.engine().add(matcher);
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, LimiterConfig, LoggingConfig, XbotConfig,
    load_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingError};
pub use runtime::{EventSender, RuntimeBuilder, XbotRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
