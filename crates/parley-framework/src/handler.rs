//! Handler erasure.
//!
//! Any `async fn(ActivityContext) -> R` where `R: IntoHandlerResult` can be
//! used as a route handler or a plugin hook. [`into_handler`] erases it into a
//! [`BoxedHandler`] so that routes of different shapes can live in one list.
//!
//! ```rust,ignore
//! async fn ack(_ctx: ActivityContext) {}
//!
//! async fn card(_ctx: ActivityContext) -> InvokeResponse {
//!     InvokeResponse::ok().with_body(json!({ "statusCode": 200 }))
//! }
//!
//! async fn relay(ctx: ActivityContext) -> Result<(), BoxError> {
//!     ctx.send(Activity::message("on it")).await?;
//!     ctx.next().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use parley_core::InvokeResponse;

use crate::context::ActivityContext;
use crate::error::{BoxError, HandlerResult};

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler =
    Arc<dyn Fn(ActivityContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

// ============================================================================
// Return-value conversion
// ============================================================================

/// Converts a handler's return value into a [`HandlerResult`].
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> HandlerResult {
        Ok(None)
    }
}

impl IntoHandlerResult for InvokeResponse {
    fn into_handler_result(self) -> HandlerResult {
        Ok(Some(self))
    }
}

/// A bare JSON value becomes the body of a `200` response.
impl IntoHandlerResult for Value {
    fn into_handler_result(self) -> HandlerResult {
        Ok(Some(InvokeResponse::ok().with_body(self)))
    }
}

impl<T: IntoHandlerResult> IntoHandlerResult for Option<T> {
    fn into_handler_result(self) -> HandlerResult {
        match self {
            Some(value) => value.into_handler_result(),
            None => Ok(None),
        }
    }
}

impl<T, E> IntoHandlerResult for Result<T, E>
where
    T: IntoHandlerResult,
    E: Into<BoxError>,
{
    fn into_handler_result(self) -> HandlerResult {
        self.map_err(Into::into)?.into_handler_result()
    }
}

// ============================================================================
// Erasure
// ============================================================================

/// Erases an async function into a [`BoxedHandler`].
pub fn into_handler<F, Fut, R>(handler: F) -> BoxedHandler
where
    F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult,
{
    Arc::new(
        move |ctx: ActivityContext| -> BoxFuture<'static, HandlerResult> {
            let fut = handler(ctx);
            Box::pin(async move { fut.await.into_handler_result() })
        },
    )
}
