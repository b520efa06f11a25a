//! Logging behavior for request and notification pipelines.

use herald_core::{
    BoxError, HandlerBehavior, Next, Notification, NotificationBehavior, PipelineBehavior, Request,
};
#[cfg(feature = "tracing")]
use std::{any::type_name, time::Instant};

/// A behavior that logs the messages passing through it.
///
/// It can be registered on all three pipelines. Without the `tracing` feature
/// it only delegates.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBehavior;

impl<R: Request> PipelineBehavior<R> for LoggingBehavior {
    async fn handle<'a>(&'a self, _request: &'a R, next: Next<'a, R::Response>) -> Result<R::Response, BoxError> {
        #[cfg(feature = "tracing")]
        let started = Instant::now();
        #[cfg(feature = "tracing")]
        tracing::debug!(request = type_name::<R>(), "Handling request");

        let result = next.await;

        #[cfg(feature = "tracing")]
        {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => tracing::debug!(request = type_name::<R>(), elapsed_ms, "Request handled"),
                Err(error) => tracing::warn!(request = type_name::<R>(), elapsed_ms, %error, "Request failed"),
            }
        }
        result
    }
}

impl<N: Notification> NotificationBehavior<N> for LoggingBehavior {
    async fn handle<'a>(&'a self, _notification: &'a N, next: Next<'a, ()>) -> Result<(), BoxError> {
        let result = next.await;
        #[cfg(feature = "tracing")]
        {
            match &result {
                Ok(()) => tracing::debug!(notification = type_name::<N>(), "Notification published"),
                Err(error) => tracing::warn!(notification = type_name::<N>(), %error, "Publish failed"),
            }
        }
        result
    }
}

impl<N: Notification> HandlerBehavior<N> for LoggingBehavior {
    async fn handle<'a>(&'a self, _notification: &'a N, next: Next<'a, ()>) -> Result<(), BoxError> {
        #[cfg(feature = "tracing")]
        let started = Instant::now();
        let result = next.await;
        #[cfg(feature = "tracing")]
        {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => tracing::debug!(notification = type_name::<N>(), elapsed_ms, "Notification handled"),
                Err(error) => tracing::warn!(notification = type_name::<N>(), elapsed_ms, %error, "Notification handler failed"),
            }
        }
        result
    }
}
