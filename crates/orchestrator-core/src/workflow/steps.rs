//! Typed step contracts.
//!
//! A process is started with a [`ProcessRequest`] and finishes by publishing
//! exactly one [`StepOutcome`] to the correlation registry under the process
//! instance key.

use chrono::{DateTime, Utc};

use crate::error::VerificationError;
use crate::types::{ChallengeId, OperationId, Recipient, ValidationResult};

pub const SEND_VERIFICATION_EMAIL: &str = "send-verification-email";
pub const SEND_VERIFICATION_SMS: &str = "send-verification-sms";
pub const VALIDATE_VERIFICATION_CODE: &str = "validate-verification-code";

/// Input of a verification process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessRequest {
    /// Create an operation for the recipient and send it a one-time code.
    SendVerification { recipient: Recipient },
    /// Check a submitted code against the operation's active challenge.
    ValidateCode {
        operation_id: OperationId,
        code: String,
    },
}

impl ProcessRequest {
    /// Process definition key the engine runs for this request.
    pub fn process_key(&self) -> &'static str {
        match self {
            Self::SendVerification { recipient } => match recipient.channel {
                crate::types::DeliveryChannel::Email => SEND_VERIFICATION_EMAIL,
                crate::types::DeliveryChannel::Sms => SEND_VERIFICATION_SMS,
            },
            Self::ValidateCode { .. } => VALIDATE_VERIFICATION_CODE,
        }
    }
}

/// Terminal result of a verification process.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    ChallengeIssued {
        operation_id: OperationId,
        challenge_id: ChallengeId,
        expires_at: DateTime<Utc>,
    },
    /// Success and business failure (mismatch, expiry) alike.
    Validated(ValidationResult),
    /// The protocol refused the step.
    Failed {
        operation_id: Option<OperationId>,
        error: VerificationError,
    },
    /// The step crashed before producing an outcome.
    Aborted { reason: String },
}

impl StepOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChallengeIssued { .. } => "challenge_issued",
            Self::Validated(_) => "validated",
            Self::Failed { .. } => "failed",
            Self::Aborted { .. } => "aborted",
        }
    }
}
