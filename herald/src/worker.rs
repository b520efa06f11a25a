//! Notification worker.
//!
//! A single loop dequeues envelopes, resolves their handlers in a fresh
//! scope, and starts one delivery task per handler. Before a task is started
//! the loop acquires a concurrency slot for it, so at most
//! `max_concurrent_consumers` handler invocations run at once and a saturated
//! worker leaves notifications in the bounded queue.
//!
//! A failed attempt releases its slot, waits out the retry delay, and puts
//! its envelope back on the queue. Once the retry policy is exhausted the
//! envelope is recorded in the dead-letter sink.
//!
//! # Draining
//!
//! When the drain token fires the queue stops accepting publishes, but the
//! loop keeps going until the queue is empty and no delivery task is left,
//! so retries scheduled during the drain still run to completion.

use crate::{
    dead_letter::{DeadLetterRecord, DeadLetterSink},
    envelope::{DeliveryAttempt, NotificationEnvelope},
    queue::{NotificationQueue, QueueReceiver},
};
use futures::FutureExt;
use herald_core::{DeliveryError, HandlerId, HandlerRegistry, RetryPolicy};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};
use tokio::{
    runtime::Handle,
    sync::{OwnedSemaphorePermit, Semaphore},
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, error, info, info_span, warn};

pub(crate) type Envelope<H> = NotificationEnvelope<<H as HandlerRegistry>::Scope>;

/// State shared between the worker loop and its delivery tasks.
pub(crate) struct Worker<H: HandlerRegistry> {
    registry: Arc<H>,
    queue: Arc<NotificationQueue<Envelope<H>>>,
    limiter: Arc<Semaphore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    slot_timeout: Duration,
}

impl<H: HandlerRegistry> Worker<H> {
    pub(crate) fn new(
        registry: Arc<H>,
        queue: Arc<NotificationQueue<Envelope<H>>>,
        dead_letters: Arc<dyn DeadLetterSink>,
        max_concurrent_consumers: usize,
        slot_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            limiter: Arc::new(Semaphore::new(max_concurrent_consumers)),
            dead_letters,
            slot_timeout,
        }
    }

    /// Start the loop on `runtime`.
    ///
    /// When the loop exits, panics included, the queue stops accepting
    /// publishes and `done` is cancelled.
    pub(crate) fn spawn(
        self: Arc<Self>,
        runtime: &Handle,
        receiver: QueueReceiver<Envelope<H>>,
        drain: CancellationToken,
        done: CancellationToken,
    ) -> JoinHandle<()> {
        runtime.spawn(async move {
            let _exit = ExitGuard {
                queue: self.queue.clone(),
                _done: done.drop_guard(),
            };
            self.run(receiver, drain).await;
        })
    }

    async fn run(self: Arc<Self>, mut receiver: QueueReceiver<Envelope<H>>, drain: CancellationToken) {
        let mut tasks = JoinSet::new();
        let mut draining = false;

        info!(
            capacity = self.queue.capacity(),
            max_concurrent_consumers = self.limiter.available_permits(),
            "Notification worker started"
        );

        loop {
            if draining && self.queue.depth() == 0 && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = drain.cancelled(), if !draining => {
                    draining = true;
                    self.queue.stop();
                    info!(
                        queued = self.queue.depth(),
                        in_flight = tasks.len(),
                        "Draining notification queue"
                    );
                }

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = result {
                        error!(error = %err, "Notification delivery task failed");
                    }
                }

                envelope = receiver.dequeue() => match envelope {
                    Some(envelope) => self.dispatch(envelope, &mut tasks).await,
                    None => break,
                },
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "Notification delivery task failed");
            }
        }

        info!("Notification worker stopped");
    }

    /// Fan an envelope out to its handlers and start their deliveries.
    async fn dispatch(self: &Arc<Self>, envelope: Envelope<H>, tasks: &mut JoinSet<()>) {
        let policy = self.registry.retry_policies().get_or_default(envelope.kind);

        // Scoped factories run here, on the loop task.
        let scope = self.registry.create_scope();
        let planned = panic::catch_unwind(AssertUnwindSafe(|| envelope.plan(&scope)));
        drop(scope);

        let attempts = match planned {
            Ok(attempts) => attempts,
            Err(panic) => {
                let error = DeliveryError::Panicked(panic_message(panic.as_ref()));
                error!(
                    notification = %envelope.kind,
                    target = ?envelope.target,
                    error = %error,
                    "Resolving notification handlers panicked"
                );
                let worker = self.clone();
                let handler = envelope.target;
                tasks.spawn(async move { worker.settle(envelope, handler, error, policy).await });
                return;
            }
        };

        if attempts.is_empty() {
            debug!(
                notification = %envelope.kind,
                target = ?envelope.target,
                "No handler left for notification; dropping it"
            );
            return;
        }

        for attempt in attempts {
            let envelope = envelope.pinned(attempt.handler);
            let slot = self.acquire_slot().await;
            let span = info_span!(
                "notification_delivery",
                notification = %envelope.kind,
                handler = %attempt.handler,
                attempt = envelope.retry_count + 1,
            );

            let worker = self.clone();
            tasks.spawn(
                async move { worker.deliver(envelope, attempt, slot, policy).await }.instrument(span),
            );
        }
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit, DeliveryError> {
        match tokio::time::timeout(self.slot_timeout, self.limiter.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(DeliveryError::LimiterClosed),
            Err(_) => Err(DeliveryError::SlotTimeout(self.slot_timeout)),
        }
    }

    /// Run one attempt and settle its outcome.
    async fn deliver(
        &self,
        envelope: Envelope<H>,
        attempt: DeliveryAttempt,
        slot: Result<OwnedSemaphorePermit, DeliveryError>,
        policy: RetryPolicy,
    ) {
        let handler = attempt.handler;
        let outcome = match slot {
            Ok(permit) => {
                let outcome = invoke(attempt).await;
                drop(permit);
                outcome
            }
            Err(err) => Err(err),
        };

        let error = match outcome {
            Ok(()) => {
                debug!("Notification delivered");
                return;
            }
            Err(error) => error,
        };

        self.settle(envelope, Some(handler), error, policy).await;
    }

    /// Count a failed attempt, then schedule a retry or dead-letter the envelope.
    async fn settle(
        &self,
        mut envelope: Envelope<H>,
        handler: Option<HandlerId>,
        error: DeliveryError,
        policy: RetryPolicy,
    ) {
        envelope.retry_count += 1;
        if !policy.should_retry(envelope.retry_count) {
            self.dead_letter(envelope, handler, error);
            return;
        }

        let delay = policy.delay_for(envelope.retry_count);
        debug!(
            error = %error,
            failed_attempts = envelope.retry_count,
            max_attempts = policy.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "Notification delivery failed; retry scheduled"
        );
        tokio::time::sleep(delay).await;

        if let Err(envelope) = self.queue.requeue(envelope).await {
            error!(error = %error, "Notification queue closed before a retry could be scheduled");
            self.dead_letter(envelope, handler, error);
        }
    }

    fn dead_letter(&self, envelope: Envelope<H>, handler: Option<HandlerId>, error: DeliveryError) {
        warn!(
            error = %error,
            attempts = envelope.retry_count,
            "Notification delivery failed permanently; moving to dead letters"
        );
        self.dead_letters.append(DeadLetterRecord::new(
            envelope.message,
            envelope.kind,
            handler,
            error,
            envelope.retry_count,
        ));
    }
}

/// Closes the queue and releases `done` when the worker loop ends.
struct ExitGuard<T> {
    queue: Arc<NotificationQueue<T>>,
    _done: DropGuard,
}

impl<T> Drop for ExitGuard<T> {
    fn drop(&mut self) {
        self.queue.stop();
    }
}

/// Run the handler pipeline, turning panics into delivery errors.
async fn invoke(attempt: DeliveryAttempt) -> Result<(), DeliveryError> {
    match AssertUnwindSafe(attempt.run).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(DeliveryError::Handler(err)),
        Err(panic) => Err(DeliveryError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::DeadLetterQueue;
    use herald_core::Notification;
    use herald_std::registry::Registry;

    struct Refunded;
    impl Notification for Refunded {}

    #[tokio::test]
    async fn test_failed_requeue_keeps_last_error() {
        let (queue, receiver) = NotificationQueue::bounded(1);
        drop(receiver);
        let dead_letters = Arc::new(DeadLetterQueue::new());
        let worker = Worker::new(
            Arc::new(Registry::new()),
            Arc::new(queue),
            dead_letters.clone(),
            1,
            Duration::from_secs(1),
        );

        let envelope = Envelope::<Registry>::new(Arc::new(Refunded));
        worker
            .settle(
                envelope,
                Some(HandlerId::new(3)),
                DeliveryError::Handler("gateway down".into()),
                RetryPolicy::new(3, Duration::from_millis(1)),
            )
            .await;

        let records = dead_letters.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].attempt_count, 1);
        assert_eq!(records[0].handler, Some(HandlerId::new(3)));
        assert!(matches!(&*records[0].error, DeliveryError::Handler(source) if source.to_string() == "gateway down"));
    }

    #[test]
    fn test_exit_guard_closes_queue() {
        let (queue, _receiver) = NotificationQueue::<u32>::bounded(1);
        let queue = Arc::new(queue);
        let done = CancellationToken::new();

        let guard = ExitGuard {
            queue: queue.clone(),
            _done: done.clone().drop_guard(),
        };
        assert!(queue.is_accepting());

        drop(guard);
        assert!(!queue.is_accepting());
        assert!(done.is_cancelled());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
