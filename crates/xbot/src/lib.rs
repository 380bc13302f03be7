//! # xbot
//!
//! Keyword matching and priority dispatch for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌────────────────────────────────────┐
//! │   Runtime   │────▶│ Engine (prio 100)│────▶│ rule → filters → limiter → handler │──▶ own task
//! │ (event loop)│     │ Engine ...       │     │ rule → ...          (block stops)  │
//! └─────────────┘     └──────────────────┘     └────────────────────────────────────┘
//! ```
//!
//! - **Runtime**: loads configuration, sets up logging and feeds events to engines
//! - **Engines**: evaluate matchers from highest to lowest priority
//! - **Matchers**: a rule, filters, an optional rate limit, middleware and a handler
//! - **Keywords**: Aho-Corasick and trie matching over versioned keyword sets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use xbot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = XbotRuntime::builder().build(my_bot)?;
//!
//!     runtime
//!         .engine()
//!         .add(on_command("ping").handle(|_ctx: Arc<Context>| async { "pong" }));
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use xbot_core as core;
pub use xbot_framework as framework;
pub use xbot_keyword as keyword;
pub use xbot_runtime as runtime;

/// Commonly used types for building bots.
///
/// ```rust,ignore
/// use xbot::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use xbot_runtime::{EventSender, XbotRuntime};

    // Dispatch
    pub use xbot_framework::{Context, Engine, Filter, Matcher, Middleware, from_fn};

    // Rule builders
    pub use xbot_framework::{
        on_ac_keywords, on_command, on_command_group, on_dfa_keywords, on_full_match,
        on_keywords, on_message, on_meta, on_notice, on_prefix, on_regex, on_request, on_suffix,
    };

    // Built-in filters and middleware
    pub use xbot_framework::{filter, middleware};

    // Keyword sets
    pub use xbot_keyword::{CowKeywords, KeywordManager, KeywordProvider, LockedKeywords};

    // Bot and event types
    pub use xbot_core::{Bot, BoxedBot, BoxedEvent, Message, Segment};
}
