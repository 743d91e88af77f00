use std::time::Duration;

use thiserror::Error;

use crate::types::{CorrelationId, OperationId, OperationStatus};

/// Failures of the correlation registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("correlation id {0} already has a pending waiter")]
    DuplicateCorrelationId(CorrelationId),

    #[error("no result for correlation id {id} within {timeout:?}")]
    Timeout { id: CorrelationId, timeout: Duration },

    #[error("waiter for correlation id {0} was removed before a result arrived")]
    Cancelled(CorrelationId),
}

/// An external notification or SCA dependency refused or failed a call.
#[derive(Debug, Clone, Error)]
#[error("{channel} channel: {message}")]
pub struct ChannelError {
    pub channel: &'static str,
    pub message: String,
}

impl ChannelError {
    pub fn new(channel: &'static str, message: impl Into<String>) -> Self {
        Self {
            channel,
            message: message.into(),
        }
    }
}

/// Failures of the verification protocol.
///
/// Code mismatch and expiry are not errors; they are reported through
/// `ValidationResult`.
#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("unknown verification operation {0}")]
    UnknownOperation(OperationId),

    #[error("operation {0} has no active challenge")]
    NoActiveChallenge(OperationId),

    #[error("operation {operation_id} is already {}", .status.as_str())]
    AlreadyFinalized {
        operation_id: OperationId,
        status: OperationStatus,
    },

    #[error("challenge delivery failed for operation {operation_id}: {source}")]
    ChannelDeliveryFailed {
        operation_id: OperationId,
        #[source]
        source: ChannelError,
    },
}

/// Failures handing a process to the workflow engine.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("workflow engine unavailable: {0}")]
    Unavailable(String),

    #[error("workflow engine queue is full")]
    QueueFull,
}

/// Umbrella error for the caller-side flow.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("process step failed: {0}")]
    StepFailed(String),

    #[error("unexpected step outcome: {0}")]
    UnexpectedOutcome(String),
}

impl OrchestratorError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Registry(RegistryError::Timeout { .. }) => 504,
            Self::Registry(RegistryError::DuplicateCorrelationId(_)) => 409,
            Self::Registry(RegistryError::Cancelled(_)) => 500,
            Self::Verification(VerificationError::UnknownOperation(_)) => 404,
            Self::Verification(VerificationError::NoActiveChallenge(_))
            | Self::Verification(VerificationError::AlreadyFinalized { .. }) => 409,
            Self::Verification(VerificationError::ChannelDeliveryFailed { .. }) => 502,
            Self::Gateway(_) => 503,
            Self::StepFailed(_) => 502,
            Self::UnexpectedOutcome(_) => 500,
        }
    }

    /// Short machine-readable tag used in error response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registry(RegistryError::Timeout { .. }) => "timeout",
            Self::Registry(RegistryError::DuplicateCorrelationId(_)) => "duplicate_correlation_id",
            Self::Registry(RegistryError::Cancelled(_)) => "cancelled",
            Self::Verification(VerificationError::UnknownOperation(_)) => "unknown_operation",
            Self::Verification(VerificationError::NoActiveChallenge(_)) => "no_active_challenge",
            Self::Verification(VerificationError::AlreadyFinalized { .. }) => "already_finalized",
            Self::Verification(VerificationError::ChannelDeliveryFailed { .. }) => {
                "channel_delivery_failed"
            }
            Self::Gateway(_) => "gateway_unavailable",
            Self::StepFailed(_) => "step_failed",
            Self::UnexpectedOutcome(_) => "internal",
        }
    }
}
