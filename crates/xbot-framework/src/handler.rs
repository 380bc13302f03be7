//! Handlers and handler return values.
//!
//! Any `Fn(Arc<Context>) -> impl Future` is a [`Handler`] as long as its
//! output implements [`HandlerResponse`]:
//!
//! ```rust,ignore
//! // nothing to send
//! async fn log_only(ctx: Arc<Context>) {
//!     tracing::info!(text = %ctx.plain_text(), "seen");
//! }
//!
//! // a String is sent back as a reply
//! async fn echo(ctx: Arc<Context>) -> String {
//!     ctx.args()
//! }
//!
//! // errors are logged, never propagated
//! async fn fallible(ctx: Arc<Context>) -> Result<String, ApiError> { ... }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{error, warn};

use xbot_core::Message;

use crate::context::Context;

// ============================================================================
// HandlerResponse
// ============================================================================

/// Turns a handler's return value into side effects.
#[async_trait]
pub trait HandlerResponse: Send {
    async fn into_response(self, ctx: Arc<Context>);
}

/// No action.
#[async_trait]
impl HandlerResponse for () {
    async fn into_response(self, _ctx: Arc<Context>) {}
}

/// Replies with the text. Empty strings are not sent.
#[async_trait]
impl HandlerResponse for String {
    async fn into_response(self, ctx: Arc<Context>) {
        if self.is_empty() {
            return;
        }
        if let Err(e) = ctx.reply(self).await {
            warn!(error = %e, "failed to send reply");
        }
    }
}

#[async_trait]
impl HandlerResponse for &'static str {
    async fn into_response(self, ctx: Arc<Context>) {
        self.to_string().into_response(ctx).await;
    }
}

#[async_trait]
impl HandlerResponse for Message {
    async fn into_response(self, ctx: Arc<Context>) {
        if self.is_empty() {
            return;
        }
        if let Err(e) = ctx.reply(self).await {
            warn!(error = %e, "failed to send reply");
        }
    }
}

#[async_trait]
impl<T: HandlerResponse> HandlerResponse for Option<T> {
    async fn into_response(self, ctx: Arc<Context>) {
        if let Some(t) = self {
            t.into_response(ctx).await;
        }
    }
}

/// On `Err`, the error is logged.
#[async_trait]
impl<T: HandlerResponse, E: Display + Send> HandlerResponse for Result<T, E> {
    async fn into_response(self, ctx: Arc<Context>) {
        match self {
            Ok(t) => t.into_response(ctx).await,
            Err(e) => error!(error = %e, "handler returned an error"),
        }
    }
}

// ============================================================================
// Handler
// ============================================================================

/// An event handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Arc<Context>) -> BoxFuture<'static, ()>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerResponse + 'static,
{
    fn call(&self, ctx: Arc<Context>) -> BoxFuture<'static, ()> {
        let fut = self(Arc::clone(&ctx));
        Box::pin(async move {
            fut.await.into_response(ctx).await;
        })
    }
}

/// A shared, type-erased handler.
pub type BoxedHandler = Arc<dyn Handler>;
