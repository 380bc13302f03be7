//! # xbot framework
//!
//! Matching and dispatch for bot applications.
//!
//! This layer provides:
//! - [`Context`]: per-event state shared by rules, filters and handlers
//! - Rule builders ([`on_command`], [`on_regex`], [`on_ac_keywords`], ...)
//!   producing [`Matcher`]s
//! - [`Filter`]s and the built-in filter set
//! - Rate limiters ([`MemoryLimiter`], [`SlidingWindowLimiter`])
//! - Tower-based [`Middleware`] for engines and matchers
//! - [`Engine`]: priority-ordered dispatch with handlers launched as tasks
//! - [`EngineRegistry`]: fan-out of events to several engines
//! - [`SensitiveFilter`]: reloadable sensitive-word detection and masking

pub mod context;
pub mod engine;
pub mod error;
pub mod filter;
pub mod handler;
pub mod keyword;
pub mod limiter;
pub mod matcher;
pub mod matcher_builders;
pub mod middleware;
pub mod registry;
pub mod sensitive;

pub use context::{BotSettings, Context, RegexMatch};
pub use engine::Engine;
pub use error::{FrameworkError, FrameworkResult, LimiterError, MiddlewareError};
pub use filter::Filter;
pub use handler::{BoxedHandler, Handler, HandlerResponse};
pub use keyword::{ContextKeywordProvider, GroupKeywords};
pub use limiter::{
    DEFAULT_SWEEP_INTERVAL, Limiter, MemoryLimiter, SlidingWindowLimiter, WindowStore,
    limiter_key,
};
pub use matcher::{ExceedFn, Matcher, Rule};
pub use matcher_builders::{
    on_ac_keywords, on_ac_keywords_with, on_command, on_command_group, on_dfa_keywords,
    on_dfa_keywords_with, on_full_match, on_keywords, on_message, on_meta, on_notice, on_prefix,
    on_regex, on_request, on_suffix,
};
pub use middleware::{BoxError, BoxedService, Middleware, Next, from_fn};
pub use registry::EngineRegistry;
pub use sensitive::SensitiveFilter;
