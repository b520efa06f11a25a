//! The mediator.
//!
//! [`Mediator`] is the single entry point of the runtime:
//!
//! - [`send`](Mediator::send) runs a request through its pipeline behaviors
//!   and its handler on the caller's task and returns the response.
//! - [`publish`](Mediator::publish) runs a notification through its publish
//!   behaviors and queues it. Delivery happens later on the worker, and
//!   delivery failures never reach the publisher.
//! - [`stop`](Mediator::stop) drains the queue and waits for the worker.

use crate::{
    config::{ConfigError, MediatorConfig},
    dead_letter::{DeadLetterQueue, DeadLetterSink},
    queue::NotificationQueue,
    worker::{Envelope, Worker},
};
use futures::FutureExt;
use herald_core::{
    BoxError, HandlerRegistry, HeraldError, Next, Notification, PublishError, Request,
    ResolutionScope, RetryPolicy, SendError, compose,
};
use herald_std::registry::Registry;
use std::{any::type_name, sync::Arc};
use thiserror::Error;
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// In-process mediator.
///
/// Created with [`Mediator::builder`]. The worker runs on the Tokio runtime
/// that was current when [`MediatorBuilder::start`] was called.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::builder()
///     .request_handler::<Ping, _>(PingHandler)
///     .notification_handler::<OrderPlaced, _>(SendReceipt)
///     .build()?;
///
/// let mediator = Mediator::builder(registry).start()?;
///
/// let pong = mediator.send(Ping(1)).await?;
/// mediator.publish(OrderPlaced { id: 7 }).await?;
///
/// mediator.stop().await?;
/// ```
pub struct Mediator<H: HandlerRegistry = Registry> {
    registry: Arc<H>,
    queue: Arc<NotificationQueue<Envelope<H>>>,
    dead_letters: Arc<dyn DeadLetterSink>,
    dead_letter_queue: Option<Arc<DeadLetterQueue>>,
    drain: CancellationToken,
    done: CancellationToken,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<H: HandlerRegistry> Mediator<H> {
    /// Start configuring a mediator around `registry`.
    pub fn builder(registry: H) -> MediatorBuilder<H> {
        MediatorBuilder::new(Arc::new(registry))
    }

    /// Start configuring a mediator around a registry that is shared with
    /// other owners.
    pub fn builder_shared(registry: Arc<H>) -> MediatorBuilder<H> {
        MediatorBuilder::new(registry)
    }

    /// Send a request to its handler and wait for the response.
    ///
    /// Pipeline behaviors run in registration order around the handler. If
    /// no handler is registered the call fails with
    /// [`SendError::HandlerNotFound`] and no behavior runs.
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, SendError> {
        let scope = self.registry.create_scope();
        let handler = scope
            .request_handler::<R>()
            .ok_or(SendError::HandlerNotFound {
                request: type_name::<R>(),
            })?;
        let behaviors = scope.pipeline_behaviors::<R>();

        let request = &request;
        let handler = &*handler;
        let terminal = Next::new(move || handler.handle_dyn(request));
        compose(terminal, behaviors.as_slice(), move |behavior, next| {
            behavior.handle_dyn(request, next)
        })
        .await
        .map_err(SendError::Handler)
    }

    /// Publish a notification, waiting for queue space if necessary.
    ///
    /// Returns once the notification is queued; it is not delivered yet.
    /// Publishing a type without handlers succeeds without queueing anything.
    pub async fn publish<N: Notification>(&self, notification: N) -> Result<(), PublishError> {
        self.publish_with_cancel(notification, &CancellationToken::new())
            .await
    }

    /// Like [`publish`](Self::publish), giving up with
    /// [`PublishError::Cancelled`] if `cancel` fires while waiting for space.
    pub async fn publish_with_cancel<N: Notification>(
        &self,
        notification: N,
        cancel: &CancellationToken,
    ) -> Result<(), PublishError> {
        if !self.queue.is_accepting() {
            return Err(PublishError::QueueClosed);
        }

        let scope = self.registry.create_scope();
        let behaviors = scope.notification_behaviors::<N>();
        let notification = Arc::new(notification);

        let message: &N = &notification;
        let shared = &notification;
        let scope = &scope;
        let queue = &*self.queue;
        let terminal = Next::new(move || {
            async move {
                if !scope.has_notification_handlers::<N>() {
                    debug!(notification = type_name::<N>(), "No handler registered; notification dropped");
                    return Ok(());
                }
                let envelope = Envelope::<H>::new(shared.clone());
                queue.enqueue(envelope, cancel).await.map_err(BoxError::from)
            }
            .boxed()
        });

        compose(terminal, behaviors.as_slice(), move |behavior, next| {
            behavior.handle_dyn(message, next)
        })
        .await
        .map_err(|err| match err.downcast::<PublishError>() {
            Ok(err) => *err,
            Err(err) => PublishError::Behavior(err),
        })
    }

    /// Number of queued, undelivered notifications.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// The queue bound.
    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Whether publishes are still accepted.
    pub fn is_accepting(&self) -> bool {
        self.queue.is_accepting()
    }

    /// The registry, for registrations after start.
    pub fn registry(&self) -> &H {
        &self.registry
    }

    /// The dead-letter sink.
    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterSink> {
        &self.dead_letters
    }

    /// The built-in dead-letter queue, or `None` if a sink was supplied with
    /// [`MediatorBuilder::dead_letters`].
    pub fn dead_letter_queue(&self) -> Option<&DeadLetterQueue> {
        self.dead_letter_queue.as_deref()
    }

    /// Set the retry policy of notification type `N`.
    ///
    /// Applies to deliveries started after the call.
    pub fn set_retry_policy<N: Notification>(&self, policy: RetryPolicy) {
        self.registry.retry_policies().set_for::<N>(policy);
    }

    /// Stop accepting publishes, deliver everything still queued, and wait for
    /// the worker to finish.
    ///
    /// Retries scheduled during the drain are honored, so this can take as
    /// long as the longest remaining retry sequence. Calling it again, or
    /// concurrently, waits for the same drain.
    pub async fn stop(&self) -> Result<(), HeraldError> {
        self.queue.stop();
        self.drain.cancel();

        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => {
                handle
                    .await
                    .map_err(|err| HeraldError::WorkerPanicked(err.to_string()))?;
                info!("Mediator stopped");
            }
            None => self.done.cancelled().await,
        }
        Ok(())
    }
}

impl<H: HandlerRegistry> Drop for Mediator<H> {
    fn drop(&mut self) {
        // Lets a worker that was never stopped drain and exit.
        self.drain.cancel();
    }
}

/// Errors raised by [`MediatorBuilder::start`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `start` was called outside a Tokio runtime.
    #[error("the mediator must be started from within a Tokio runtime")]
    NoRuntime,
}

/// Builder for a [`Mediator`].
pub struct MediatorBuilder<H: HandlerRegistry> {
    registry: Arc<H>,
    config: MediatorConfig,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    shutdown: Option<CancellationToken>,
}

impl<H: HandlerRegistry> MediatorBuilder<H> {
    fn new(registry: Arc<H>) -> Self {
        Self {
            registry,
            config: MediatorConfig::default(),
            dead_letters: None,
            shutdown: None,
        }
    }

    /// Use `config` instead of [`MediatorConfig::default`].
    pub fn config(mut self, config: MediatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Send dead letters to `sink` instead of the built-in [`DeadLetterQueue`].
    pub fn dead_letters(mut self, sink: impl DeadLetterSink) -> Self {
        self.dead_letters = Some(Arc::new(sink));
        self
    }

    /// Drain and stop the mediator when `token` is cancelled.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Validate the configuration and spawn the worker.
    ///
    /// Fails with [`StartError::NoRuntime`] outside a Tokio runtime.
    pub fn start(self) -> Result<Mediator<H>, StartError> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| StartError::NoRuntime)?;

        let (queue, receiver) = NotificationQueue::bounded(self.config.queue_capacity);
        let queue = Arc::new(queue);
        let (dead_letters, dead_letter_queue) = match self.dead_letters {
            Some(sink) => (sink, None),
            None => {
                let queue = Arc::new(DeadLetterQueue::new());
                (queue.clone() as Arc<dyn DeadLetterSink>, Some(queue))
            }
        };
        let drain = match &self.shutdown {
            Some(token) => token.child_token(),
            None => CancellationToken::new(),
        };
        let done = CancellationToken::new();

        let worker = Arc::new(Worker::new(
            self.registry.clone(),
            queue.clone(),
            dead_letters.clone(),
            self.config.max_concurrent_consumers,
            self.config.slot_timeout,
        ));
        let handle = worker.spawn(&runtime, receiver, drain.clone(), done.clone());

        Ok(Mediator {
            registry: self.registry,
            queue,
            dead_letters,
            dead_letter_queue,
            drain,
            done,
            worker: parking_lot::Mutex::new(Some(handle)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_outside_runtime_fails() {
        let err = Mediator::builder(Registry::new()).start().err();
        assert_eq!(err, Some(StartError::NoRuntime));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let err = Mediator::builder(Registry::new())
            .config(MediatorConfig::default().with_queue_capacity(0))
            .start()
            .err();
        assert_eq!(err, Some(StartError::Config(ConfigError::ZeroQueueCapacity)));
    }

    #[tokio::test]
    async fn test_custom_sink_replaces_builtin_queue() {
        let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel();
        let mediator = Mediator::builder(Registry::new())
            .dead_letters(sender)
            .start()
            .unwrap();
        assert!(mediator.dead_letter_queue().is_none());

        let mediator = Mediator::builder(Registry::new()).start().unwrap();
        assert!(mediator.dead_letter_queue().is_some_and(DeadLetterQueue::is_empty));
    }
}
