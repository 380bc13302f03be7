//! Matchers pair a rule with a handler.
//!
//! A [`Matcher`] accepts an event when, in this order,
//!
//! 1. its rule passes,
//! 2. every filter passes (evaluated in registration order, stopping at the
//!    first rejection),
//! 3. its rate limiter, if any, admits the sender.
//!
//! Accepted events run the handler wrapped in the matcher's middleware.
//! Matchers are usually created through the rule builders in
//! [`matcher_builders`](crate::matcher_builders):
//!
//! ```rust,ignore
//! let matcher = on_command("weather")
//!     .name("weather")
//!     .priority(10)
//!     .block(true)
//!     .filter(filter::only_group())
//!     .limit(Duration::from_secs(60), 3)
//!     .handle(weather);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tower::ServiceExt;
use tower::service_fn;
use tower::util::BoxService;
use tracing::{debug, trace};

use crate::context::Context;
use crate::filter::Filter;
use crate::handler::{BoxedHandler, Handler};
use crate::limiter::{Limiter, MemoryLimiter, limiter_key};
use crate::middleware::{BoxError, Middleware, compose};

/// A type-erased rule.
pub type Rule = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Called when the rate limiter turns an otherwise matching event away.
pub type ExceedFn = Arc<dyn Fn(&Context) + Send + Sync>;

/// A rule, its filters and limiter, and the handler they guard.
pub struct Matcher {
    name: Option<String>,
    rule: Rule,
    filters: Vec<Filter>,
    limiter: Option<Arc<dyn Limiter>>,
    on_exceed: Option<ExceedFn>,
    middlewares: Vec<Middleware>,
    handler: Option<BoxedHandler>,
    priority: i32,
    block: bool,
}

impl Matcher {
    /// Creates a matcher with the given rule, priority `0`, not blocking.
    pub fn new<F>(rule: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self {
            name: None,
            rule: Arc::new(rule),
            filters: Vec::new(),
            limiter: None,
            on_exceed: None,
            middlewares: Vec::new(),
            handler: None,
            priority: 0,
            block: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a filter. Filters run in the order they were added.
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Limits each sender to `count` matches per sliding `window`.
    ///
    /// Senders are keyed by group and user, so the same user is counted
    /// separately in every group.
    pub fn limit(self, window: Duration, count: usize) -> Self {
        self.limit_with(Arc::new(MemoryLimiter::new(window, count)))
    }

    /// Uses a custom limiter, for example one backed by an external store.
    pub fn limit_with(mut self, limiter: Arc<dyn Limiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Sets the callback run when the limiter rejects an event.
    pub fn on_exceed<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.on_exceed = Some(Arc::new(f));
        self
    }

    /// Appends a middleware around the handler. The first one added is the
    /// outermost.
    pub fn use_middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Sets the handler, replacing any previous one.
    pub fn handle<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Higher priorities are evaluated first.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// When set, a match stops lower priority matchers from being evaluated.
    pub fn block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get_priority(&self) -> i32 {
        self.priority
    }

    pub fn is_blocking(&self) -> bool {
        self.block
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn limiter(&self) -> Option<&Arc<dyn Limiter>> {
        self.limiter.as_ref()
    }

    pub(crate) fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Evaluates the rule, then the filters, then the rate limiter.
    pub fn matches(&self, ctx: &Context) -> bool {
        if !(self.rule)(ctx) {
            return false;
        }

        if let Some(index) = self.filters.iter().position(|f| !f.check(ctx)) {
            trace!(matcher = self.display_name(), filter = index, "rejected by filter");
            return false;
        }

        if let Some(limiter) = &self.limiter {
            let key = limiter_key(ctx.user_id(), ctx.group_id());
            if !limiter.allow(&key) {
                debug!(matcher = self.display_name(), key = %key, "rate limit exceeded");
                if let Some(on_exceed) = &self.on_exceed {
                    on_exceed(ctx);
                }
                return false;
            }
        }

        true
    }

    /// Runs the handler inside this matcher's middleware.
    ///
    /// A matcher without a handler succeeds immediately.
    pub async fn execute(&self, ctx: Arc<Context>) -> Result<(), BoxError> {
        let Some(handler) = self.handler.clone() else {
            return Ok(());
        };

        let core = BoxService::new(service_fn(move |ctx: Arc<Context>| {
            let handler = Arc::clone(&handler);
            async move {
                handler.call(ctx).await;
                Ok::<(), BoxError>(())
            }
        }));

        compose(&self.middlewares, core).oneshot(ctx).await
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("block", &self.block)
            .field("filters", &self.filters.len())
            .field("limited", &self.limiter.is_some())
            .field("middlewares", &self.middlewares.len())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
