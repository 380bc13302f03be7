//! The dispatch engine.
//!
//! An [`Engine`] owns a set of matchers kept in descending priority order.
//! For every event it
//!
//! 1. creates a fresh [`Context`],
//! 2. runs its middleware around the matcher loop,
//! 3. evaluates matchers in order, stopping when the context is aborted,
//! 4. launches the handler of every matching matcher as its own task, and
//! 5. stops after a blocking matcher matched.
//!
//! Handlers are not awaited by [`Engine::handle_event`]; use
//! [`Engine::wait_idle`] or [`Engine::shutdown`] to wait for them.
//!
//! ```rust,ignore
//! let engine = Engine::new();
//! engine.use_middleware(middleware::recovery());
//! engine.add(on_command("ping").handle(|_ctx| async { "pong" }));
//! engine.add(on_message().priority(-1).handle(log_everything));
//!
//! let matched = engine.handle_event(event, bot).await;
//! ```

use std::cmp::Reverse;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tower::service_fn;
use tower::util::BoxService;
use tracing::{Instrument, debug, debug_span, error, trace, warn};

use xbot_core::{BoxedBot, BoxedEvent};

use crate::context::{BotSettings, Context};
use crate::matcher::Matcher;
use crate::middleware::{BoxError, Middleware, compose, panic_message};

#[derive(Default)]
struct Shared {
    matchers: RwLock<Vec<Arc<Matcher>>>,
    middlewares: RwLock<Vec<Middleware>>,
    settings: RwLock<Arc<BotSettings>>,
    tracker: TaskTracker,
}

/// A priority-ordered set of matchers with engine-wide middleware.
///
/// Cloning is cheap and clones share all state.
#[derive(Clone, Default)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine whose contexts carry `settings`.
    pub fn with_settings(settings: BotSettings) -> Self {
        let engine = Self::new();
        engine.set_settings(settings);
        engine
    }

    /// Replaces the settings seen by events dispatched from now on.
    pub fn set_settings(&self, settings: BotSettings) {
        *self.shared.settings.write() = Arc::new(settings);
    }

    pub fn settings(&self) -> Arc<BotSettings> {
        Arc::clone(&self.shared.settings.read())
    }

    /// Registers a matcher.
    ///
    /// Matchers are kept sorted by descending priority; matchers with equal
    /// priority keep their registration order.
    pub fn add(&self, matcher: Matcher) -> &Self {
        let mut matchers = self.shared.matchers.write();
        matchers.push(Arc::new(matcher));
        matchers.sort_by_key(|m| Reverse(m.get_priority()));
        self
    }

    pub fn extend(&self, matchers: impl IntoIterator<Item = Matcher>) -> &Self {
        for matcher in matchers {
            self.add(matcher);
        }
        self
    }

    /// Unregisters every matcher named `name`, returning how many were removed.
    ///
    /// Dispatches already in progress still see them.
    pub fn remove(&self, name: &str) -> usize {
        let mut matchers = self.shared.matchers.write();
        let before = matchers.len();
        matchers.retain(|m| m.get_name() != Some(name));
        before - matchers.len()
    }

    /// Appends an engine middleware. The first one added is the outermost.
    pub fn use_middleware(&self, middleware: Middleware) -> &Self {
        self.shared.middlewares.write().push(middleware);
        self
    }

    /// Registered matchers in evaluation order.
    pub fn matchers(&self) -> Vec<Arc<Matcher>> {
        self.shared.matchers.read().clone()
    }

    pub fn matcher_count(&self) -> usize {
        self.shared.matchers.read().len()
    }

    /// Number of handler tasks still running.
    pub fn in_flight(&self) -> usize {
        self.shared.tracker.len()
    }

    /// Dispatches one event.
    ///
    /// Returns `true` if at least one matcher matched, handler or not. Handlers
    /// launched for the event may still be running when this returns.
    pub async fn handle_event(&self, event: BoxedEvent, bot: BoxedBot) -> bool {
        let span = debug_span!("dispatch", event_type = %event.event_type());
        let ctx = Arc::new(Context::new(event, bot, self.settings()));
        let middlewares = self.shared.middlewares.read().clone();

        let shared = Arc::clone(&self.shared);
        let core = BoxService::new(service_fn(move |ctx: Arc<Context>| {
            shared.run_matchers(&ctx);
            futures::future::ready(Ok::<(), BoxError>(()))
        }));

        let result = compose(&middlewares, core)
            .oneshot(Arc::clone(&ctx))
            .instrument(span)
            .await;
        if let Err(err) = result {
            warn!(error = %err, "engine middleware failed");
        }

        ctx.is_matched()
    }

    /// Waits until every handler launched so far has finished.
    pub async fn wait_idle(&self) {
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        self.shared.tracker.reopen();
    }

    /// Waits for in-flight handlers to finish.
    pub async fn shutdown(&self) {
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        debug!("engine shut down");
    }
}

impl Shared {
    fn run_matchers(&self, ctx: &Arc<Context>) {
        let matchers = self.matchers.read().clone();

        for matcher in matchers {
            if ctx.is_aborted() {
                trace!("dispatch aborted");
                break;
            }
            if !matcher.matches(ctx) {
                continue;
            }

            trace!(matcher = matcher.display_name(), priority = matcher.get_priority(), "matched");
            self.spawn_handler(Arc::clone(&matcher), Arc::clone(ctx));
            ctx.set_matched();

            if matcher.is_blocking() {
                debug!(
                    matcher = matcher.display_name(),
                    "blocking matcher matched, stopping dispatch"
                );
                break;
            }
        }
    }

    fn spawn_handler(&self, matcher: Arc<Matcher>, ctx: Arc<Context>) {
        if !matcher.has_handler() {
            return;
        }
        let span = debug_span!("handler", matcher = matcher.display_name());
        self.tracker.spawn(
            async move {
                match AssertUnwindSafe(matcher.execute(ctx)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(error = %err, "handler failed"),
                    Err(payload) => {
                        error!(panic = %panic_message(payload.as_ref()), "handler panicked")
                    }
                }
            }
            .instrument(span),
        );
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("matcher_count", &self.matcher_count())
            .field("middlewares", &self.shared.middlewares.read().len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, priority: i32) -> Matcher {
        Matcher::new(|_| true).name(name).priority(priority)
    }

    fn order(engine: &Engine) -> Vec<String> {
        engine
            .matchers()
            .iter()
            .map(|m| m.get_name().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_priority_order_is_stable() {
        let engine = Engine::new();
        engine
            .add(named("0", 0))
            .add(named("5a", 5))
            .add(named("1", 1))
            .add(named("5b", 5));

        assert_eq!(order(&engine), ["5a", "5b", "1", "0"]);
    }

    #[test]
    fn test_negative_priorities_sort_last() {
        let engine = Engine::new();
        engine.extend([named("low", -10), named("default", 0), named("high", 3)]);
        assert_eq!(order(&engine), ["high", "default", "low"]);
    }

    #[test]
    fn test_remove_by_name() {
        let engine = Engine::new();
        engine.extend([named("a", 1), named("b", 0), named("a", -1)]);

        assert_eq!(engine.remove("a"), 2);
        assert_eq!(engine.remove("missing"), 0);
        assert_eq!(order(&engine), ["b"]);
    }

    #[test]
    fn test_settings_are_replaced() {
        let engine = Engine::with_settings(BotSettings::new().command_prefix("!"));
        assert_eq!(engine.settings().get_command_prefix(), "!");
        engine.set_settings(BotSettings::default());
        assert_eq!(engine.settings().get_command_prefix(), "/");
    }
}
