//! # herald - In-Process Mediator
//!
//! `herald` decouples the code that issues messages from the code that handles
//! them. Two kinds of messages are supported:
//!
//! - **Requests** go to exactly one handler on the caller's task and return a
//!   typed response.
//! - **Notifications** go to zero or more handlers. Publishing puts them on a
//!   bounded queue; a background worker delivers them with a concurrency cap,
//!   retries failed deliveries with a per-type policy, and dead-letters the
//!   ones that keep failing.
//!
//! Both paths can be wrapped with behaviors (middleware) composed in
//! registration order, first-registered outermost.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! struct Ping(u32);
//! impl Request for Ping {
//!     type Response = u32;
//! }
//!
//! struct PingHandler;
//! impl RequestHandler<Ping> for PingHandler {
//!     async fn handle(&self, ping: &Ping) -> Result<u32, BoxError> {
//!         Ok(ping.0 + 1)
//!     }
//! }
//!
//! let registry = Registry::builder()
//!     .request_handler::<Ping, _>(PingHandler)
//!     .build()?;
//! let mediator = Mediator::builder(registry).start()?;
//!
//! assert_eq!(mediator.send(Ping(1)).await?, 2);
//! mediator.stop().await?;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod config;
mod dead_letter;
mod envelope;
mod mediator;
mod queue;
mod worker;

pub use config::{
    ConfigError, DEFAULT_MAX_CONCURRENT_CONSUMERS, DEFAULT_QUEUE_CAPACITY, DEFAULT_SLOT_TIMEOUT,
    MediatorConfig,
};
pub use dead_letter::{DeadLetterQueue, DeadLetterRecord, DeadLetterSink};
pub use mediator::{Mediator, MediatorBuilder, StartError};

// Messages
pub use herald_core::{HandlerId, Message, MessageKind, Notification, Request};

// Handlers
pub use herald_core::{DynNotificationHandler, DynRequestHandler, NotificationHandler, RequestHandler};

// Behaviors
pub use herald_core::{
    DynHandlerBehavior, DynNotificationBehavior, DynPipelineBehavior, HandlerBehavior, Next,
    NotificationBehavior, PipelineBehavior, compose,
};

// Registry seam
pub use herald_core::{HandlerRegistry, ResolutionScope, Resolved};

// Retry
pub use herald_core::{Backoff, RetryPolicy, RetryPolicyStore};

// Errors
pub use herald_core::{
    BoxError, BoxFuture, DeliveryError, HeraldError, PublishError, RegistryError, SendError,
};

pub use herald_std::registry::{Registry, RegistryBuilder, RegistryScope};

pub use tokio_util::sync::CancellationToken;

/// Standard behavior implementations.
pub mod behaviors {
    #![allow(clippy::wildcard_imports)]
    pub use herald_std::behaviors::*;
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use herald_std::testing::*;
}

/// Prelude module - common imports for Herald.
///
/// # Usage
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    // Messages and handlers
    pub use crate::{Notification, NotificationHandler, Request, RequestHandler};

    // Behaviors
    pub use crate::{HandlerBehavior, Next, NotificationBehavior, PipelineBehavior};

    // Runtime
    pub use crate::{DeadLetterQueue, Mediator, MediatorConfig, Registry, RetryPolicy};

    // Errors
    pub use crate::{BoxError, PublishError, SendError};
}
