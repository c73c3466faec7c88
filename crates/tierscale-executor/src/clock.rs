//! Time sources for cost accrual.

use std::sync::Arc;
use std::time::SystemTime;

/// Returns the current time whenever cost is charged.
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

/// The wall clock.
pub fn system_clock() -> Clock {
    Arc::new(SystemTime::now)
}

/// Wall time at creation, advanced by tokio's clock.
///
/// Follows paused and advanced time under `tokio::time::pause`, so cost can
/// be checked against the same timeline the receive timeouts run on.
pub fn runtime_clock() -> Clock {
    let origin = SystemTime::now();
    let start = tokio::time::Instant::now();
    Arc::new(move || origin + start.elapsed())
}
