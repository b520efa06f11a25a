//! # Handlers
//!
//! Handlers are the terminal point of every pipeline: the place where business
//! logic runs. A request type has at most one handler; a notification type may
//! have any number of them.
//!
//! Both traits use native `async fn` for static dispatch. Registries store the
//! object-safe twins ([`DynRequestHandler`], [`DynNotificationHandler`]), which
//! every implementor gets for free through a blanket implementation.

use crate::{
    error::BoxError,
    message::{Notification, Request},
};
use futures::future::BoxFuture;
use std::future::Future;

/// Serves one request type.
///
/// # Example
///
/// ```rust,ignore
/// struct PingHandler;
///
/// impl RequestHandler<Ping> for PingHandler {
///     async fn handle(&self, request: &Ping) -> Result<u32, BoxError> {
///         Ok(request.0 + 1)
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot handle requests of type `{R}`",
    label = "missing `RequestHandler<{R}>` implementation",
    note = "Request handlers must implement `handle` for the request type `{R}`."
)]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    /// Produce the response for `request`.
    fn handle(&self, request: &R) -> impl Future<Output = Result<R::Response, BoxError>> + Send;
}

/// Dynamic object-safe version of [`RequestHandler`].
pub trait DynRequestHandler<R: Request>: Send + Sync + 'static {
    /// Produce the response for `request` (dynamic dispatch version).
    fn handle_dyn<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<R::Response, BoxError>>;
}

impl<R: Request, H: RequestHandler<R>> DynRequestHandler<R> for H {
    fn handle_dyn<'a>(&'a self, request: &'a R) -> BoxFuture<'a, Result<R::Response, BoxError>> {
        Box::pin(self.handle(request))
    }
}

/// Reacts to one notification type.
///
/// Returning an error marks the delivery attempt as failed; the worker retries
/// it according to the notification type's retry policy and dead-letters it
/// once the policy is exhausted.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot handle notifications of type `{N}`",
    label = "missing `NotificationHandler<{N}>` implementation",
    note = "Notification handlers must implement `handle` for the notification type `{N}`."
)]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    /// Handle one delivery of `notification`.
    fn handle(&self, notification: &N) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Dynamic object-safe version of [`NotificationHandler`].
pub trait DynNotificationHandler<N: Notification>: Send + Sync + 'static {
    /// Handle one delivery of `notification` (dynamic dispatch version).
    fn handle_dyn<'a>(&'a self, notification: &'a N) -> BoxFuture<'a, Result<(), BoxError>>;
}

impl<N: Notification, H: NotificationHandler<N>> DynNotificationHandler<N> for H {
    fn handle_dyn<'a>(&'a self, notification: &'a N) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.handle(notification))
    }
}
