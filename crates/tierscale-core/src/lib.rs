//! tierscale-core — shared building blocks for the tierscale control loop.
//!
//! The control loop is split into three roles (monitor, decider, executor)
//! that only talk to each other through text messages. This crate holds
//! everything those roles agree on:
//!
//! ```text
//! types        MetricSample, ScalingAction, SizeTier, TierTable, ThresholdPolicy
//! protocol     metric / decision message bodies, Envelope, OutboundMessage
//! config       tierscale.toml parser → Settings
//! collaborator MetricSource, InstanceController (external services)
//! error        ProtocolError, ConfigError, CollaboratorError, StepError
//! ```

pub mod collaborator;
pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use collaborator::{CollaboratorFuture, InstanceController, MetricSource};
pub use config::{Config, Settings};
pub use error::*;
pub use protocol::{Envelope, OutboundMessage};
pub use types::*;
