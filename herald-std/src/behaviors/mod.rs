//! Standard behaviors.
//!
//! - [`LoggingBehavior`]: logs every stage it wraps (with the `tracing` feature)
//! - [`TimeoutBehavior`]: bounds the time spent in the inner stages (with the `timeout` feature)

mod logging;
#[cfg(feature = "timeout")]
mod timeout;

pub use logging::LoggingBehavior;
#[cfg(feature = "timeout")]
pub use timeout::{TimeoutBehavior, TimeoutError};
