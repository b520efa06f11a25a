//! Retry policies for notification delivery.
//!
//! A [`RetryPolicy`] bounds how many times a failing delivery is attempted and
//! how long the worker waits between attempts. Policies are keyed by
//! notification type in a [`RetryPolicyStore`]; types without an explicit
//! entry get the store's default the first time they are looked up.

use crate::message::{MessageKind, Notification};
use parking_lot::RwLock;
use std::{any::TypeId, collections::HashMap, time::Duration};

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Wait the base delay every time.
    #[default]
    Fixed,
    /// Wait `delay * n` before the n-th retry.
    Linear,
    /// Wait `delay * 2^(n-1)` before the n-th retry.
    Exponential,
}

/// Bounds the delivery attempts of one notification type.
///
/// `max_attempts` counts every invocation, the first one included: a policy
/// with `max_attempts = 3` invokes a failing handler three times and then
/// dead-letters the notification. A value of `0` is treated as `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
    max_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Fixed-delay policy.
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
            max_delay: None,
        }
    }

    /// Policy that never retries.
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Use a growing delay between attempts.
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Cap the delay produced by [`Backoff::Linear`] and [`Backoff::Exponential`].
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Maximum number of invocations, the first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Base delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Growth strategy.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Whether another attempt is allowed after `failed_attempts` failures.
    pub fn should_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts < self.max_attempts()
    }

    /// Delay before the retry that follows the `retry`-th failure (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let delay = match self.backoff {
            Backoff::Fixed => return self.delay,
            Backoff::Linear => self.delay.saturating_mul(retry),
            Backoff::Exponential => {
                let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor)
            }
        };

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Per-notification-type retry policies.
///
/// Lookups for a type without an entry insert the default policy, so every
/// type that has been delivered once has a stable entry.
#[derive(Debug, Default)]
pub struct RetryPolicyStore {
    default: RetryPolicy,
    policies: RwLock<HashMap<TypeId, RetryPolicy>>,
}

impl RetryPolicyStore {
    /// Create a store whose default is [`RetryPolicy::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with a custom default policy.
    pub fn with_default(default: RetryPolicy) -> Self {
        Self {
            default,
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// The policy applied to types without an explicit entry.
    pub fn default_policy(&self) -> RetryPolicy {
        self.default
    }

    /// Replace the default policy. Entries already inserted keep their policy.
    pub fn set_default(&mut self, default: RetryPolicy) {
        self.default = default;
    }

    /// The policy for `kind`, inserting the default if none is set.
    pub fn get_or_default(&self, kind: MessageKind) -> RetryPolicy {
        if let Some(policy) = self.policies.read().get(&kind.type_id()) {
            return *policy;
        }
        *self
            .policies
            .write()
            .entry(kind.type_id())
            .or_insert(self.default)
    }

    /// Replace the policy for `kind`.
    pub fn set(&self, kind: MessageKind, policy: RetryPolicy) {
        self.policies.write().insert(kind.type_id(), policy);
    }

    /// Typed shorthand for [`get_or_default`](Self::get_or_default).
    pub fn get_or_default_for<N: Notification>(&self) -> RetryPolicy {
        self.get_or_default(MessageKind::of::<N>())
    }

    /// Typed shorthand for [`set`](Self::set).
    pub fn set_for<N: Notification>(&self, policy: RetryPolicy) {
        self.set(MessageKind::of::<N>(), policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Created;
    impl Notification for Created {}

    struct Deleted;
    impl Notification for Deleted {}

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(1));
        assert_eq!(policy.backoff(), Backoff::Fixed);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(1));
    }

    #[test]
    fn test_should_retry_counts_first_attempt() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_backoff_delays() {
        let base = Duration::from_millis(100);

        let fixed = RetryPolicy::new(5, base);
        assert_eq!(fixed.delay_for(4), base);

        let linear = RetryPolicy::new(5, base).with_backoff(Backoff::Linear);
        assert_eq!(linear.delay_for(1), Duration::from_millis(100));
        assert_eq!(linear.delay_for(3), Duration::from_millis(300));

        let exponential = RetryPolicy::new(5, base).with_backoff(Backoff::Exponential);
        assert_eq!(exponential.delay_for(1), Duration::from_millis(100));
        assert_eq!(exponential.delay_for(2), Duration::from_millis(200));
        assert_eq!(exponential.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_max_delay_caps_growth() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .with_backoff(Backoff::Exponential)
            .with_max_delay(Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
        assert_eq!(policy.delay_for(40), Duration::from_millis(250));
    }

    #[test]
    fn test_store_inserts_default_once() {
        let store = RetryPolicyStore::with_default(RetryPolicy::new(2, Duration::ZERO));
        assert_eq!(store.get_or_default_for::<Created>().max_attempts(), 2);

        store.set_for::<Deleted>(RetryPolicy::new(7, Duration::ZERO));
        assert_eq!(store.get_or_default_for::<Deleted>().max_attempts(), 7);
        assert_eq!(store.get_or_default_for::<Created>().max_attempts(), 2);
    }
}
