//! Middleware for engines and matchers.
//!
//! A middleware is a [`tower::Layer`] over a boxed service taking the
//! dispatch context. Engines wrap the whole matcher loop in their middleware;
//! matchers wrap their handler. In both cases the first middleware registered
//! is the outermost one.
//!
//! The chain is rebuilt for every execution, so stateful layers such as
//! [`concurrency`] keep their state in shared handles rather than in the
//! service itself.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use xbot_framework::middleware::{self, from_fn};
//!
//! let engine = Engine::new();
//! engine.use_middleware(middleware::recovery());
//! engine.use_middleware(middleware::logger());
//! engine.use_middleware(from_fn(|ctx, next| async move {
//!     if ctx.user_id() == Some(42) {
//!         return Ok(());
//!     }
//!     next.run(ctx).await
//! }));
//!
//! let slow = on_command("report")
//!     .use_middleware(middleware::timeout(Duration::from_secs(30)))
//!     .handle(report);
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::timeout::TimeoutLayer;
use tower::util::{BoxLayer, BoxService};
use tower::{Service, ServiceExt};
use tower_layer::{Layer, layer_fn};
use tracing::{debug, error, warn};

pub use tower::BoxError;

use crate::context::Context;
use crate::error::MiddlewareError;

/// The service type every middleware wraps.
pub type BoxedService = BoxService<Arc<Context>, (), BoxError>;

/// A type-erased, cloneable middleware layer.
#[derive(Clone)]
pub struct Middleware(BoxLayer<BoxedService, Arc<Context>, (), BoxError>);

impl Middleware {
    /// Wraps any tower layer whose service accepts the dispatch context.
    pub fn layer<L>(layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Arc<Context>, Response = ()> + Send + 'static,
        <L::Service as Service<Arc<Context>>>::Error: Into<BoxError>,
        <L::Service as Service<Arc<Context>>>::Future: Send + 'static,
    {
        Self(BoxLayer::new(layer_fn(move |inner: BoxedService| {
            layer.layer(inner).map_err(|e| -> BoxError { e.into() })
        })))
    }

    fn wrap(&self, inner: BoxedService) -> BoxedService {
        self.0.layer(inner)
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}

/// Wraps `inner` in `middlewares`, the first one ending up outermost.
pub fn compose(middlewares: &[Middleware], inner: BoxedService) -> BoxedService {
    middlewares
        .iter()
        .rev()
        .fold(inner, |service, middleware| middleware.wrap(service))
}

// ============================================================================
// from_fn
// ============================================================================

/// The rest of the chain, handed to a [`from_fn`] middleware.
pub struct Next {
    inner: BoxedService,
}

impl Next {
    /// Runs the remaining middleware and the wrapped work.
    pub async fn run(self, ctx: Arc<Context>) -> Result<(), BoxError> {
        self.inner.oneshot(ctx).await
    }
}

/// Builds a middleware from an async closure.
///
/// The closure decides whether and when to call [`Next::run`]. Returning
/// without calling it skips everything further in.
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Arc<Context>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    let f = Arc::new(f);
    Middleware::layer(layer_fn(move |inner: BoxedService| FnService {
        f: Arc::clone(&f),
        next: Some(inner),
    }))
}

struct FnService<F> {
    f: Arc<F>,
    next: Option<BoxedService>,
}

impl<F, Fut> Service<Arc<Context>> for FnService<F>
where
    F: Fn(Arc<Context>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: Arc<Context>) -> Self::Future {
        match self.next.take() {
            Some(inner) => (self.f)(ctx, Next { inner }).boxed(),
            None => futures::future::ready(Err(MiddlewareError::NextConsumed.into())).boxed(),
        }
    }
}

// ============================================================================
// Built-in middleware
// ============================================================================

/// Catches panics further in, logs them and reports success.
pub fn recovery() -> Middleware {
    from_fn(|ctx, next| async move {
        match AssertUnwindSafe(next.run(Arc::clone(&ctx))).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                error!(
                    event_type = %ctx.event().event_type(),
                    panic = %panic_message(payload.as_ref()),
                    "recovered from panic"
                );
                Ok(())
            }
        }
    })
}

/// Logs handled events at `debug` once something matched.
pub fn logger() -> Middleware {
    from_fn(|ctx, next| async move {
        let start = Instant::now();
        let result = next.run(Arc::clone(&ctx)).await;
        if ctx.is_matched() {
            debug!(
                event_type = %ctx.event().event_type(),
                matched = true,
                elapsed = ?start.elapsed(),
                "event handled"
            );
        }
        result
    })
}

/// Warns when the wrapped work takes longer than `threshold`.
pub fn slow_warning(threshold: Duration) -> Middleware {
    from_fn(move |ctx, next| async move {
        let start = Instant::now();
        let result = next.run(Arc::clone(&ctx)).await;
        let elapsed = start.elapsed();
        if elapsed > threshold {
            warn!(
                event_type = %ctx.event().event_type(),
                ?elapsed,
                ?threshold,
                "slow event processing"
            );
        }
        result
    })
}

/// Fails with [`tower::timeout::error::Elapsed`] when the wrapped work does
/// not finish within `duration`.
pub fn timeout(duration: Duration) -> Middleware {
    Middleware::layer(TimeoutLayer::new(duration))
}

/// Allows at most `max` executions in flight, across every chain built from
/// this middleware.
pub fn concurrency(max: usize) -> Middleware {
    Middleware::layer(GlobalConcurrencyLimitLayer::new(max))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
