//! # Behaviors
//!
//! Behaviors are middleware stages wrapped around a terminal action. There are
//! three families, one per place a message can be intercepted:
//!
//! | Trait                    | Wraps                                       | Runs on          |
//! |--------------------------|---------------------------------------------|------------------|
//! | [`PipelineBehavior`]     | a request's handler                         | the caller       |
//! | [`NotificationBehavior`] | the publish call, up to queue admission     | the caller       |
//! | [`HandlerBehavior`]      | one notification handler invocation         | the worker       |
//!
//! All three share the same shape: a behavior receives the message and a
//! [`Next`] continuation. Awaiting `next` runs every inner stage and the
//! terminal; returning without awaiting it short-circuits the chain. Work
//! placed before the await runs "on the way in", work placed after runs
//! "on the way out".
//!
//! # Static vs Dynamic Dispatch
//!
//! Each trait uses native `async fn` for implementors. Registries store the
//! object-safe `Dyn*` twin, which is implemented for every behavior.

use crate::{
    chain::Next,
    error::BoxError,
    message::{Notification, Request},
};
use futures::future::BoxFuture;
use std::future::Future;

/// Middleware around a request's handler.
///
/// # Example
///
/// ```rust,ignore
/// struct Audit;
///
/// impl PipelineBehavior<Ping> for Audit {
///     async fn handle<'a>(&'a self, request: &'a Ping, next: Next<'a, u32>) -> Result<u32, BoxError> {
///         let response = next.await?;
///         println!("ping {} -> {}", request.0, response);
///         Ok(response)
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a pipeline behavior for `{R}`",
    label = "missing `PipelineBehavior<{R}>` implementation",
    note = "Pipeline behaviors must implement `handle` for the request type `{R}`."
)]
pub trait PipelineBehavior<R: Request>: Send + Sync + 'static {
    /// Run this stage, optionally delegating to `next`.
    fn handle<'a>(
        &'a self,
        request: &'a R,
        next: Next<'a, R::Response>,
    ) -> impl Future<Output = Result<R::Response, BoxError>> + Send + 'a;
}

/// Dynamic object-safe version of [`PipelineBehavior`].
pub trait DynPipelineBehavior<R: Request>: Send + Sync + 'static {
    /// Run this stage (dynamic dispatch version).
    fn handle_dyn<'a>(
        &'a self,
        request: &'a R,
        next: Next<'a, R::Response>,
    ) -> BoxFuture<'a, Result<R::Response, BoxError>>;
}

impl<R: Request, B: PipelineBehavior<R>> DynPipelineBehavior<R> for B {
    fn handle_dyn<'a>(
        &'a self,
        request: &'a R,
        next: Next<'a, R::Response>,
    ) -> BoxFuture<'a, Result<R::Response, BoxError>> {
        Box::pin(self.handle(request, next))
    }
}

/// Middleware around the publish operation.
///
/// The terminal of a notification pipeline admits the notification to the
/// queue, so a behavior that short-circuits keeps the notification from ever
/// being delivered. Errors returned here are reported to the publisher.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a notification behavior for `{N}`",
    label = "missing `NotificationBehavior<{N}>` implementation",
    note = "Notification behaviors must implement `handle` for the notification type `{N}`."
)]
pub trait NotificationBehavior<N: Notification>: Send + Sync + 'static {
    /// Run this stage, optionally delegating to `next`.
    fn handle<'a>(
        &'a self,
        notification: &'a N,
        next: Next<'a, ()>,
    ) -> impl Future<Output = Result<(), BoxError>> + Send + 'a;
}

/// Dynamic object-safe version of [`NotificationBehavior`].
pub trait DynNotificationBehavior<N: Notification>: Send + Sync + 'static {
    /// Run this stage (dynamic dispatch version).
    fn handle_dyn<'a>(
        &'a self,
        notification: &'a N,
        next: Next<'a, ()>,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

impl<N: Notification, B: NotificationBehavior<N>> DynNotificationBehavior<N> for B {
    fn handle_dyn<'a>(
        &'a self,
        notification: &'a N,
        next: Next<'a, ()>,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.handle(notification, next))
    }
}

/// Middleware around one notification handler invocation.
///
/// Runs on the worker, once per delivery attempt, inside the concurrency
/// slot. An error returned here fails the attempt just like a handler error.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a handler behavior for `{N}`",
    label = "missing `HandlerBehavior<{N}>` implementation",
    note = "Handler behaviors must implement `handle` for the notification type `{N}`."
)]
pub trait HandlerBehavior<N: Notification>: Send + Sync + 'static {
    /// Run this stage, optionally delegating to `next`.
    fn handle<'a>(
        &'a self,
        notification: &'a N,
        next: Next<'a, ()>,
    ) -> impl Future<Output = Result<(), BoxError>> + Send + 'a;
}

/// Dynamic object-safe version of [`HandlerBehavior`].
pub trait DynHandlerBehavior<N: Notification>: Send + Sync + 'static {
    /// Run this stage (dynamic dispatch version).
    fn handle_dyn<'a>(
        &'a self,
        notification: &'a N,
        next: Next<'a, ()>,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

impl<N: Notification, B: HandlerBehavior<N>> DynHandlerBehavior<N> for B {
    fn handle_dyn<'a>(
        &'a self,
        notification: &'a N,
        next: Next<'a, ()>,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.handle(notification, next))
    }
}
