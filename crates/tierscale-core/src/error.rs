//! Error types shared by the tierscale roles.

use std::time::Duration;

use thiserror::Error;

use crate::types::{Cycle, InstanceId};

/// Result type alias for message encoding/decoding.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for calls into external collaborators.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// A message body that does not match its schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed message {body:?}: {reason}")]
    Malformed { body: String, reason: String },

    #[error("unknown action {0:?}")]
    UnknownAction(String),
}

impl ProtocolError {
    pub(crate) fn malformed(body: &str, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            body: body.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while reading or validating `tierscale.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {0:?}")]
    Duration(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failure reported by a `MetricSource` or `InstanceController`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("metric source failed for {instance_id}: {reason}")]
    MetricSource { instance_id: InstanceId, reason: String },

    #[error("instance controller failed for {instance_id}: {reason}")]
    Controller { instance_id: InstanceId, reason: String },
}

/// Why a role skipped one instance's step in a cycle.
///
/// None of these abort a role: the step is logged and the loop moves on to
/// the next instance or cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error(transparent)]
    MalformedMessage(#[from] ProtocolError),

    #[error("unknown instance {0:?}")]
    UnknownInstance(InstanceId),

    #[error("no message received within {0:?}")]
    ReceiveTimeout(Duration),

    #[error(transparent)]
    ExternalCallFailure(#[from] CollaboratorError),

    #[error("stale message for {instance_id}: cycle {cycle} is not newer than {latest}")]
    StaleMessage {
        instance_id: InstanceId,
        cycle: Cycle,
        latest: Cycle,
    },

    #[error("send to {endpoint} failed: {reason}")]
    SendFailure { endpoint: String, reason: String },

    #[error("tier index {tier_index} out of range for {instance_id}")]
    TierOutOfRange {
        instance_id: InstanceId,
        tier_index: usize,
    },
}

impl StepError {
    /// Short label used as the `kind` field in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StepError::MalformedMessage(_) => "malformed_message",
            StepError::UnknownInstance(_) => "unknown_instance",
            StepError::ReceiveTimeout(_) => "receive_timeout",
            StepError::ExternalCallFailure(_) => "external_call_failure",
            StepError::StaleMessage { .. } => "stale_message",
            StepError::SendFailure { .. } => "send_failure",
            StepError::TierOutOfRange { .. } => "tier_out_of_range",
        }
    }

    /// Timeouts are a policy no-op rather than a failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StepError::ReceiveTimeout(_))
    }
}
