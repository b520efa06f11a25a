//! Bounded notification queue.
//!
//! Many publishers, one consumer. Publishers wait for space when the queue is
//! full. Once the queue is stopped it rejects new notifications, but retries
//! scheduled by the worker are still accepted so a drain can finish them.

use herald_core::PublishError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Producer side of the queue.
pub(crate) struct NotificationQueue<T> {
    sender: mpsc::Sender<T>,
    stopped: CancellationToken,
}

/// Consumer side of the queue, owned by the worker.
pub(crate) struct QueueReceiver<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T: Send> NotificationQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub(crate) fn bounded(capacity: usize) -> (Self, QueueReceiver<T>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Self {
            sender,
            stopped: CancellationToken::new(),
        };
        (queue, QueueReceiver { receiver })
    }

    /// Admit `item`, waiting for space if the queue is full.
    ///
    /// Fails with [`PublishError::Cancelled`] if `cancel` fires first and with
    /// [`PublishError::QueueClosed`] if the queue is or gets stopped.
    pub(crate) async fn enqueue(&self, item: T, cancel: &CancellationToken) -> Result<(), PublishError> {
        if !self.is_accepting() {
            return Err(PublishError::QueueClosed);
        }

        let permit = tokio::select! {
            biased;
            _ = self.stopped.cancelled() => return Err(PublishError::QueueClosed),
            _ = cancel.cancelled() => return Err(PublishError::Cancelled),
            permit = self.sender.reserve() => permit.map_err(|_| PublishError::QueueClosed)?,
        };
        permit.send(item);
        Ok(())
    }

    /// Put a retry back on the queue. Bypasses the stop switch.
    ///
    /// Returns the item if the consumer is gone.
    pub(crate) async fn requeue(&self, item: T) -> Result<(), T> {
        self.sender.send(item).await.map_err(|err| err.0)
    }

}

impl<T> NotificationQueue<T> {
    /// Stop accepting new items. Publishers waiting for space are released
    /// with [`PublishError::QueueClosed`].
    pub(crate) fn stop(&self) {
        self.stopped.cancel();
    }

    /// Whether new items are admitted.
    pub(crate) fn is_accepting(&self) -> bool {
        !self.stopped.is_cancelled()
    }

    /// Number of items waiting to be dequeued.
    pub(crate) fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// The queue bound.
    pub(crate) fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item. Returns `None` once every sender is gone.
    pub(crate) async fn dequeue(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}
