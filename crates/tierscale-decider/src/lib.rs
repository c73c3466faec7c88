//! tierscale-decider — turns metric messages into scaling decisions.
//!
//! # Policy
//!
//! ```text
//! if cpu > up.cpu || mem > up.mem || disk > up.disk || net > up.net:
//!     scale_up          // any pressure grows the instance
//! elif cpu < lo.cpu && mem < lo.mem && disk < lo.disk && net < lo.net:
//!     scale_down        // only a fully idle instance shrinks
//! else:
//!     no_action         // inside the hysteresis band
//! ```
//!
//! [`evaluate`] is pure. [`DecisionEngine::step`] validates one incoming
//! envelope and produces the outgoing decision; [`Decider`] owns the mailbox
//! and drives one bounded wait per managed instance each cycle.

pub mod decider;
pub mod policy;

pub use decider::{Decider, DeciderReport, DeciderStep, DecisionEngine};
pub use policy::evaluate;
