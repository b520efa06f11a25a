//! Error types for Herald.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`HeraldError`] - Top-level error type for all Herald operations
//! - [`SendError`] - Errors surfaced to a `send` caller
//! - [`PublishError`] - Errors surfaced to a `publish` caller
//! - [`DeliveryError`] - Errors of a single notification delivery attempt
//! - [`RegistryError`] - Errors raised while registering handlers

use std::time::Duration;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all Herald operations.
#[derive(Error, Debug)]
pub enum HeraldError {
    /// A request could not be served.
    #[error("send error: {0}")]
    Send(#[from] SendError),

    /// A notification could not be published.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// A handler registration was rejected.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The notification worker panicked and could not be joined cleanly.
    #[error("notification worker panicked: {0}")]
    WorkerPanicked(String),

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

/// Errors returned by `send`.
#[derive(Error, Debug)]
pub enum SendError {
    /// No handler is registered for the request type.
    #[error("no handler registered for request type `{request}`")]
    HandlerNotFound {
        /// Name of the request type.
        request: &'static str,
    },

    /// The handler or one of the pipeline behaviors failed.
    #[error("request handler failed")]
    Handler(#[source] BoxError),
}

impl SendError {
    /// Returns `true` if no handler was registered for the request.
    pub fn is_handler_not_found(&self) -> bool {
        matches!(self, SendError::HandlerNotFound { .. })
    }
}

/// Errors returned by `publish`.
///
/// Downstream handler failures never show up here: they happen after
/// `publish` has returned and end up in the dead-letter sink instead.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The queue has stopped accepting notifications.
    #[error("notification queue is no longer accepting notifications")]
    QueueClosed,

    /// The caller cancelled the publish while it waited for queue space.
    #[error("publish was cancelled while waiting for queue space")]
    Cancelled,

    /// A publish-time behavior failed.
    #[error("notification behavior failed")]
    Behavior(#[source] BoxError),
}

/// Errors of a single notification delivery attempt.
///
/// Every variant counts as a failed attempt for retry purposes.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The handler or one of its handler behaviors failed.
    #[error("notification handler failed: {0}")]
    Handler(#[source] BoxError),

    /// No concurrency slot became available in time.
    #[error("no concurrency slot available after {0:?}")]
    SlotTimeout(Duration),

    /// The handler, or the factory building it, panicked.
    #[error("notification handler panicked: {0}")]
    Panicked(String),

    /// The concurrency limiter was closed.
    #[error("concurrency limiter closed")]
    LimiterClosed,
}

/// Errors raised while registering handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A request type can only have one handler.
    #[error("a handler is already registered for request type `{0}`")]
    DuplicateRequestHandler(&'static str),
}

// Convenience conversions
impl From<BoxError> for HeraldError {
    fn from(err: BoxError) -> Self {
        HeraldError::Custom(err)
    }
}

impl From<BoxError> for DeliveryError {
    fn from(err: BoxError) -> Self {
        DeliveryError::Handler(err)
    }
}
