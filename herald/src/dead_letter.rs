//! Dead letters.
//!
//! A notification delivery that exhausts its retry policy ends up in a
//! [`DeadLetterSink`] as a [`DeadLetterRecord`]. Nothing is ever removed by
//! the mediator; inspection and removal are up to the sink's owner.

use chrono::{DateTime, Utc};
use herald_core::{DeliveryError, HandlerId, MessageKind, Notification};
use parking_lot::Mutex;
use std::{any::Any, fmt, sync::Arc};
use tokio::sync::mpsc;

/// A delivery that failed for good.
#[derive(Clone)]
pub struct DeadLetterRecord {
    message: Arc<dyn Any + Send + Sync>,
    /// Type of the notification.
    pub kind: MessageKind,
    /// The handler the delivery was pinned to. `None` when resolving the
    /// handlers failed before any of them could be invoked.
    pub handler: Option<HandlerId>,
    /// The failure of the last attempt.
    pub error: Arc<DeliveryError>,
    /// Number of failed attempts.
    pub attempt_count: u32,
    /// When the last attempt failed.
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub(crate) fn new(
        message: Arc<dyn Any + Send + Sync>,
        kind: MessageKind,
        handler: Option<HandlerId>,
        error: DeliveryError,
        attempt_count: u32,
    ) -> Self {
        Self {
            message,
            kind,
            handler,
            error: Arc::new(error),
            attempt_count,
            failed_at: Utc::now(),
        }
    }

    /// The notification, if it is an `N`.
    pub fn message<N: Notification>(&self) -> Option<&N> {
        self.message.downcast_ref::<N>()
    }

    /// The notification, shared.
    pub fn message_arc<N: Notification>(&self) -> Option<Arc<N>> {
        self.message.clone().downcast::<N>().ok()
    }

    /// Whether the notification is an `N`.
    pub fn is<N: Notification>(&self) -> bool {
        self.kind == MessageKind::of::<N>()
    }
}

impl fmt::Debug for DeadLetterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadLetterRecord")
            .field("kind", &self.kind)
            .field("handler", &self.handler)
            .field("error", &self.error)
            .field("attempt_count", &self.attempt_count)
            .field("failed_at", &self.failed_at)
            .finish_non_exhaustive()
    }
}

/// Destination of dead letters.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot receive dead letters",
    label = "missing `DeadLetterSink` implementation",
    note = "Use `DeadLetterQueue`, an unbounded channel sender, or implement `append`."
)]
pub trait DeadLetterSink: Send + Sync + 'static {
    /// Store one record. Must not block.
    fn append(&self, record: DeadLetterRecord);
}

impl<T: DeadLetterSink> DeadLetterSink for Arc<T> {
    fn append(&self, record: DeadLetterRecord) {
        (**self).append(record);
    }
}

impl DeadLetterSink for mpsc::UnboundedSender<DeadLetterRecord> {
    fn append(&self, record: DeadLetterRecord) {
        if let Err(err) = self.send(record) {
            tracing::warn!(
                notification = %err.0.kind,
                handler = ?err.0.handler,
                "Dead letter receiver dropped; record discarded"
            );
        }
    }
}

/// In-memory append-only dead-letter store.
///
/// # Example
///
/// ```rust,ignore
/// let dead_letters = Arc::new(DeadLetterQueue::new());
/// let mediator = Mediator::builder(registry)
///     .dead_letters(dead_letters.clone())
///     .start()?;
///
/// // later
/// for record in dead_letters.snapshot() {
///     println!("{} failed {} times: {}", record.kind, record.attempt_count, record.error);
/// }
/// ```
#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl DeadLetterQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every record, oldest first.
    pub fn snapshot(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Remove and return every record.
    pub fn drain(&self) -> Vec<DeadLetterRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}

impl DeadLetterSink for DeadLetterQueue {
    fn append(&self, record: DeadLetterRecord) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Charged(u32);
    impl Notification for Charged {}

    struct Refunded;
    impl Notification for Refunded {}

    fn record(amount: u32) -> DeadLetterRecord {
        DeadLetterRecord::new(
            Arc::new(Charged(amount)),
            MessageKind::of::<Charged>(),
            Some(HandlerId::new(1)),
            DeliveryError::Handler("declined".into()),
            3,
        )
    }

    #[test]
    fn test_typed_access() {
        let record = record(10);
        assert!(record.is::<Charged>());
        assert!(!record.is::<Refunded>());
        assert_eq!(record.message::<Charged>(), Some(&Charged(10)));
        assert!(record.message::<Refunded>().is_none());
        assert_eq!(record.message_arc::<Charged>().map(|m| m.0), Some(10));
    }

    #[test]
    fn test_queue_is_append_only_until_drained() {
        let queue = DeadLetterQueue::new();
        queue.append(record(1));
        queue.append(record(2));

        assert_eq!(queue.len(), 2);
        let amounts: Vec<_> = queue
            .snapshot()
            .iter()
            .filter_map(|r| r.message::<Charged>().map(|m| m.0))
            .collect();
        assert_eq!(amounts, vec![1, 2]);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.drain().len(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        sender.append(record(5));
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.attempt_count, 3);
        assert!(received.error.to_string().contains("declined"));
    }
}
