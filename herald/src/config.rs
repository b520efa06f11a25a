//! Mediator configuration.

use std::time::Duration;
use thiserror::Error;

/// Default bound of the notification queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Default number of handler invocations allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_CONSUMERS: usize = 5;
/// Default time a delivery waits for a concurrency slot.
pub const DEFAULT_SLOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The queue must hold at least one notification.
    #[error("queue_capacity must be greater than zero")]
    ZeroQueueCapacity,

    /// At least one handler invocation must be allowed to run.
    #[error("max_concurrent_consumers must be greater than zero")]
    ZeroConcurrency,

    /// A zero slot timeout would fail every delivery that has to wait.
    #[error("slot_timeout must be greater than zero")]
    ZeroSlotTimeout,
}

/// Settings for the notification queue and worker.
///
/// # Example
///
/// ```rust,ignore
/// let config = MediatorConfig::default()
///     .with_queue_capacity(1_000)
///     .with_max_concurrent_consumers(16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediatorConfig {
    /// Maximum number of queued, undelivered notifications.
    pub queue_capacity: usize,
    /// Maximum number of handler invocations running at once.
    pub max_concurrent_consumers: usize,
    /// How long a delivery waits for a concurrency slot before failing the attempt.
    pub slot_timeout: Duration,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_concurrent_consumers: DEFAULT_MAX_CONCURRENT_CONSUMERS,
            slot_timeout: DEFAULT_SLOT_TIMEOUT,
        }
    }
}

impl MediatorConfig {
    /// Set the queue bound.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the concurrency cap.
    pub fn with_max_concurrent_consumers(mut self, consumers: usize) -> Self {
        self.max_concurrent_consumers = consumers;
        self
    }

    /// Set the slot timeout.
    pub fn with_slot_timeout(mut self, timeout: Duration) -> Self {
        self.slot_timeout = timeout;
        self
    }

    /// Check the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_concurrent_consumers == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.slot_timeout.is_zero() {
            return Err(ConfigError::ZeroSlotTimeout);
        }
        Ok(())
    }
}
