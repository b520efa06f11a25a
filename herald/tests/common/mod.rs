//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use herald::{BoxError, Notification, NotificationHandler, Request, RequestHandler, testing::ExecutionLog};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Route log output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct Ping(pub u32);

impl Request for Ping {
    type Response = u32;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlaced {
    pub id: u32,
}

impl Notification for OrderPlaced {}

#[derive(Debug, Clone, PartialEq)]
pub struct StockChanged {
    pub sku: &'static str,
}

impl Notification for StockChanged {}

// ============================================================================
// Handlers
// ============================================================================

/// Answers `Ping(n)` with `n + 1`, optionally logging `"handler"`.
#[derive(Default)]
pub struct PingHandler {
    pub log: Option<ExecutionLog>,
}

impl PingHandler {
    pub fn logging(log: ExecutionLog) -> Self {
        Self { log: Some(log) }
    }
}

impl RequestHandler<Ping> for PingHandler {
    async fn handle(&self, request: &Ping) -> Result<u32, BoxError> {
        if let Some(log) = &self.log {
            log.push("handler");
        }
        Ok(request.0 + 1)
    }
}

/// Tracks how many invocations overlap.
#[derive(Clone)]
pub struct ConcurrencyGauge {
    hold: Duration,
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            current: Arc::new(AtomicUsize::new(0)),
            max: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<N: Notification> NotificationHandler<N> for ConcurrencyGauge {
    async fn handle(&self, _notification: &N) -> Result<(), BoxError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Always panics.
pub struct PanickingHandler;

impl NotificationHandler<OrderPlaced> for PanickingHandler {
    async fn handle(&self, notification: &OrderPlaced) -> Result<(), BoxError> {
        panic!("order {} exploded", notification.id);
    }
}
