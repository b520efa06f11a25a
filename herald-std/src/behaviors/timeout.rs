//! Timeout behavior for time-limited execution.

use herald_core::{BoxError, HandlerBehavior, Next, Notification, PipelineBehavior, Request};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// Error returned when the inner stages do not finish in time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("execution timed out after {0:?}")]
pub struct TimeoutError(pub Duration);

/// A behavior that fails the stages it wraps once `duration` has elapsed.
///
/// On a handler pipeline the timeout counts as a failed attempt, so the
/// delivery is retried like any other handler error.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutBehavior {
    duration: Duration,
}

impl TimeoutBehavior {
    /// Create a new timeout behavior.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl<R: Request> PipelineBehavior<R> for TimeoutBehavior {
    async fn handle<'a>(&'a self, _request: &'a R, next: Next<'a, R::Response>) -> Result<R::Response, BoxError> {
        match timeout(self.duration, next.run()).await {
            Ok(result) => result,
            Err(_) => Err(Box::new(TimeoutError(self.duration))),
        }
    }
}

impl<N: Notification> HandlerBehavior<N> for TimeoutBehavior {
    async fn handle<'a>(&'a self, _notification: &'a N, next: Next<'a, ()>) -> Result<(), BoxError> {
        match timeout(self.duration, next.run()).await {
            Ok(result) => result,
            Err(_) => Err(Box::new(TimeoutError(self.duration))),
        }
    }
}
