//! # herald-core
//!
//! Core traits for the Herald in-process mediator.
//!
//! This crate has minimal dependencies and is meant to be imported by code that
//! only defines messages, handlers, and behaviors, or that implements its own
//! handler registry. The runtime (queue, worker, mediator) lives in `herald`.
//!
//! # Message Kinds
//!
//! - [`Request`]: exactly one handler, exactly one typed response.
//! - [`Notification`]: zero or more handlers, delivered asynchronously.
//!
//! # Pipeline Stages
//!
//! Handlers are the terminal point of every pipeline. Behaviors wrap them:
//!
//! - [`PipelineBehavior`] wraps a request on its way to its handler.
//! - [`NotificationBehavior`] wraps the publish operation itself, up to the
//!   point where the notification is queued.
//! - [`HandlerBehavior`] wraps each individual notification handler
//!   invocation performed later by the worker.
//!
//! Behaviors receive a single-use [`Next`] continuation. [`compose`] folds an
//! ordered behavior list around a terminal action so that the first-registered
//! behavior is the outermost.
//!
//! # Registry Seam
//!
//! The mediator never discovers handlers itself. It asks a [`HandlerRegistry`]
//! for a fresh [`ResolutionScope`] per call and resolves everything through it.
//!
//! # Error Types
//!
//! - [`HeraldError`] - Top-level error type
//! - [`SendError`] - Request/response failures
//! - [`PublishError`] - Publish-side failures
//! - [`DeliveryError`] - Notification delivery failures (retried, then dead-lettered)

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod behavior;
mod chain;
mod error;
mod handler;
mod message;
mod registry;
mod retry;

// Re-exports
pub use behavior::{
    DynHandlerBehavior, DynNotificationBehavior, DynPipelineBehavior, HandlerBehavior,
    NotificationBehavior, PipelineBehavior,
};
pub use chain::{Next, compose};
pub use error::{
    BoxError, DeliveryError, HeraldError, PublishError, RegistryError, SendError,
};
pub use handler::{DynNotificationHandler, DynRequestHandler, NotificationHandler, RequestHandler};
pub use message::{HandlerId, Message, MessageKind, Notification, Request};
pub use registry::{HandlerRegistry, Resolved, ResolutionScope};
pub use retry::{Backoff, RetryPolicy, RetryPolicyStore};

/// A boxed future that is `Send`, used by the object-safe traits.
pub use futures::future::BoxFuture;
