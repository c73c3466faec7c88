//! tierscale-monitor — collects telemetry and publishes metric messages.
//!
//! ```text
//! Monitor
//!   ├── discover_sizes()  → tier per instance, for memory % conversion
//!   ├── run_cycle()       → MetricSource::fetch → to_sample → send to decider
//!   └── run()             → run_cycle every interval until shutdown
//! ```

pub mod monitor;
pub mod telemetry;

pub use monitor::{Monitor, MonitorReport};
pub use telemetry::to_sample;
