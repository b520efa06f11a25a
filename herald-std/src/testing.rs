//! Testing utilities for Herald.
//!
//! This module provides handlers and behaviors that record what happens to
//! them, to make assertions about pipelines and delivery easier.
//!
//! # Features
//!
//! - [`ExecutionLog`]: A shared, ordered log of labelled entries
//! - [`RecordingBehavior`]: A behavior that logs when it is entered and left
//! - [`ShortCircuitBehavior`]: A behavior that never delegates
//! - [`RecordingHandler`]: A handler that records every notification it receives
//! - [`CountingHandler`]: A handler that counts its invocations
//! - [`FailingHandler`]: A handler that fails a configurable number of times

use herald_core::{
    BoxError, HandlerBehavior, Next, Notification, NotificationBehavior, NotificationHandler,
    PipelineBehavior, Request,
};
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

// ============================================================================
// Execution Log
// ============================================================================

/// An ordered log shared between test doubles.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ExecutionLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// A copy of all entries, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Recording Behavior
// ============================================================================

/// A behavior that logs `"{label}:before"` and `"{label}:after"` around the
/// inner stages.
///
/// The `after` entry is only written when the inner stages succeed.
///
/// # Example
///
/// ```rust,ignore
/// let log = ExecutionLog::new();
/// let registry = Registry::builder()
///     .pipeline_behavior::<Ping, _>(RecordingBehavior::new("outer", log.clone()))
///     .pipeline_behavior::<Ping, _>(RecordingBehavior::new("inner", log.clone()))
///     .build()?;
///
/// // after a send:
/// assert_eq!(log.entries(), ["outer:before", "inner:before", "inner:after", "outer:after"]);
/// ```
#[derive(Debug, Clone)]
pub struct RecordingBehavior {
    label: &'static str,
    log: ExecutionLog,
}

impl RecordingBehavior {
    /// Create a new recording behavior writing to `log`.
    pub fn new(label: &'static str, log: ExecutionLog) -> Self {
        Self { label, log }
    }

    async fn around<T>(&self, next: Next<'_, T>) -> Result<T, BoxError> {
        self.log.push(format!("{}:before", self.label));
        let value = next.await?;
        self.log.push(format!("{}:after", self.label));
        Ok(value)
    }
}

impl<R: Request> PipelineBehavior<R> for RecordingBehavior {
    async fn handle<'a>(&'a self, _request: &'a R, next: Next<'a, R::Response>) -> Result<R::Response, BoxError> {
        self.around(next).await
    }
}

impl<N: Notification> NotificationBehavior<N> for RecordingBehavior {
    async fn handle<'a>(&'a self, _notification: &'a N, next: Next<'a, ()>) -> Result<(), BoxError> {
        self.around(next).await
    }
}

impl<N: Notification> HandlerBehavior<N> for RecordingBehavior {
    async fn handle<'a>(&'a self, _notification: &'a N, next: Next<'a, ()>) -> Result<(), BoxError> {
        self.around(next).await
    }
}

// ============================================================================
// Short-Circuit Behavior
// ============================================================================

/// A behavior that answers without delegating.
///
/// On a request pipeline it returns a clone of the configured response; on a
/// notification pipeline it returns `Ok(())`, which drops the notification.
#[derive(Debug, Clone)]
pub struct ShortCircuitBehavior<T = ()> {
    response: T,
    log: Option<(&'static str, ExecutionLog)>,
}

impl ShortCircuitBehavior<()> {
    /// A short-circuit for notification pipelines.
    pub fn new() -> Self {
        Self::respond_with(())
    }
}

impl Default for ShortCircuitBehavior<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ShortCircuitBehavior<T> {
    /// A short-circuit for request pipelines answering `response`.
    pub fn respond_with(response: T) -> Self {
        Self {
            response,
            log: None,
        }
    }

    /// Also log `label` each time the behavior runs.
    pub fn logging(mut self, label: &'static str, log: ExecutionLog) -> Self {
        self.log = Some((label, log));
        self
    }

    fn record(&self) {
        if let Some((label, log)) = &self.log {
            log.push(*label);
        }
    }
}

impl<R> PipelineBehavior<R> for ShortCircuitBehavior<R::Response>
where
    R: Request,
    R::Response: Clone + Sync,
{
    async fn handle<'a>(&'a self, _request: &'a R, _next: Next<'a, R::Response>) -> Result<R::Response, BoxError> {
        self.record();
        Ok(self.response.clone())
    }
}

impl<N: Notification> NotificationBehavior<N> for ShortCircuitBehavior<()> {
    async fn handle<'a>(&'a self, _notification: &'a N, _next: Next<'a, ()>) -> Result<(), BoxError> {
        self.record();
        Ok(())
    }
}

impl<N: Notification> HandlerBehavior<N> for ShortCircuitBehavior<()> {
    async fn handle<'a>(&'a self, _notification: &'a N, _next: Next<'a, ()>) -> Result<(), BoxError> {
        self.record();
        Ok(())
    }
}

// ============================================================================
// Recording Handler
// ============================================================================

/// A handler that records every notification it receives.
///
/// Clones share the same recording.
pub struct RecordingHandler<N> {
    received: Arc<Mutex<Vec<N>>>,
    log: Option<(&'static str, ExecutionLog)>,
}

impl<N> Clone for RecordingHandler<N> {
    fn clone(&self) -> Self {
        Self {
            received: self.received.clone(),
            log: self.log.clone(),
        }
    }
}

impl<N: Clone> Default for RecordingHandler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Clone> RecordingHandler<N> {
    /// Create a new recording handler.
    pub fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            log: None,
        }
    }

    /// Also log `label` each time the handler runs.
    pub fn logging(mut self, label: &'static str, log: ExecutionLog) -> Self {
        self.log = Some((label, log));
        self
    }

    /// A copy of the received notifications, in arrival order.
    pub fn received(&self) -> Vec<N> {
        self.received.lock().clone()
    }

    /// Number of received notifications.
    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

impl<N: Notification + Clone> NotificationHandler<N> for RecordingHandler<N> {
    async fn handle(&self, notification: &N) -> Result<(), BoxError> {
        if let Some((label, log)) = &self.log {
            log.push(*label);
        }
        self.received.lock().push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// Counting Handler
// ============================================================================

/// A handler that only counts how often it ran.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct CountingHandler {
    calls: Arc<AtomicUsize>,
}

impl CountingHandler {
    /// Create a new counting handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<N: Notification> NotificationHandler<N> for CountingHandler {
    async fn handle(&self, _notification: &N) -> Result<(), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Failing Handler
// ============================================================================

/// A handler that fails its first `failures` invocations and succeeds after.
///
/// Every invocation is timestamped, so tests can check retry spacing.
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    failures: usize,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl FailingHandler {
    /// A handler that never succeeds.
    pub fn always() -> Self {
        Self::times(usize::MAX)
    }

    /// A handler that fails `failures` times, then succeeds.
    pub fn times(failures: usize) -> Self {
        Self {
            failures,
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> usize {
        self.attempts.lock().len()
    }

    /// When each invocation started.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

impl<N: Notification> NotificationHandler<N> for FailingHandler {
    async fn handle(&self, _notification: &N) -> Result<(), BoxError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            attempts.push(Instant::now());
            attempts.len()
        };
        if attempt <= self.failures {
            return Err(format!("attempt {attempt} failed").into());
        }
        Ok(())
    }
}
