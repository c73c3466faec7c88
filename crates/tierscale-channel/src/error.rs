//! Message bus error types.

use std::time::Duration;

use thiserror::Error;

use tierscale_core::StepError;

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("no message received within {0:?}")]
    ReceiveTimeout(Duration),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("endpoint already registered: {0}")]
    AlreadyRegistered(String),

    #[error("endpoint closed: {0}")]
    Closed(String),
}

impl ChannelError {
    /// Turn a send failure into the step error reported by roles.
    pub fn into_send_failure(self, endpoint: &str) -> StepError {
        StepError::SendFailure {
            endpoint: endpoint.to_string(),
            reason: self.to_string(),
        }
    }
}
