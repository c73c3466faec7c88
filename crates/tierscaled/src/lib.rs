//! tierscaled — wiring for the tierscale control loop.
//!
//! ```text
//! MessageBus
//!   ├── Monitor  ──metrics──▶ Decider ──decisions──▶ Executor
//!   │     └── MetricSource, InstanceController     └── InstanceController
//!   └── watch<bool> shutdown shared by all three
//! ```
//!
//! [`spawn_control_loop`] registers the endpoints and spawns each role on its
//! own task. The [`simulated`] module provides collaborators for running the
//! loop without a cloud account.

pub mod control_loop;
pub mod simulated;

pub use control_loop::{ControlLoop, spawn_control_loop};
pub use simulated::{ScriptedMetricSource, SimulatedCloud};
