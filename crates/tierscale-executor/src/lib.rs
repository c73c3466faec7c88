//! tierscale-executor — applies scaling decisions and tracks running cost.
//!
//! # Cycle
//!
//! ```text
//! accrue(now)            every instance: cost += rate(tier) * hours since last update
//! wait ≤ receive_timeout for one decision message
//! step(decision)         validate → plan transition → InstanceController::set_tier
//!                        → tier_index updated only if the resize succeeded
//! ```
//!
//! Accrual runs before the wait, and again for an instance the moment its
//! resize is confirmed, so every interval is charged at the tier actually held
//! during it. Time comes from an injected [`Clock`].
//!
//! # State machine
//!
//! Each instance sits at a tier index in `0..N`. `scale_up` moves one step
//! towards `N-1`, `scale_down` one step towards `0`; both are clamped at the
//! ends and `no_action` holds.

pub mod clock;
pub mod engine;
pub mod executor;
pub mod report;
pub mod state;

pub use clock::{Clock, runtime_clock, system_clock};
pub use engine::{ExecutorReport, HoldReason, TransitionEngine};
pub use executor::Executor;
pub use report::{CostReport, InstanceCost};
pub use state::{Accrual, ExecutorState, InstanceState, Transition, plan_transition};
