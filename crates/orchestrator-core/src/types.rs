//! Core types for the verification orchestrator.
//!
//! Identifiers are transparent newtypes over the engine's 64-bit keys so a
//! correlation id can never be passed where an operation id is expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// Engine-assigned key shared by a waiting caller and the step that will
/// eventually complete it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

/// Identifier of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

/// Identifier assigned by the SCA service when a challenge is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChallengeId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Recipient ───────────────────────────────────────────────────────────────

/// How a one-time code reaches the recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    Sms,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

/// A contact address the verification proves control of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    /// E-mail address or phone number, as submitted.
    pub address: String,
    pub channel: DeliveryChannel,
}

impl Recipient {
    pub fn email(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            channel: DeliveryChannel::Email,
        }
    }

    pub fn sms(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            channel: DeliveryChannel::Sms,
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel.as_str(), self.address)
    }
}

// ─── Verification Operation ──────────────────────────────────────────────────

/// Lifecycle of a verification operation.
///
/// The only paths are `Pending → ChallengeSent → {Validated | Failed}` and
/// `{Pending | ChallengeSent} → Failed` when a code cannot be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    ChallengeSent,
    Validated,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::ChallengeSent => "CHALLENGE_SENT",
            Self::Validated => "VALIDATED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Validated | Self::Failed)
    }
}

/// Why a validation did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    InvalidCode,
    Expired,
    /// The code never reached the recipient or the challenge was not recorded.
    DeliveryFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCode => "INVALID_CODE",
            Self::Expired => "EXPIRED",
            Self::DeliveryFailed => "DELIVERY_FAILED",
        }
    }
}

/// One verification attempt for one recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationOperation {
    pub operation_id: OperationId,
    pub status: OperationStatus,
    pub recipient: Recipient,
    pub created_at: DateTime<Utc>,
    /// Set once the operation reaches `Failed`.
    pub failure_reason: Option<FailureReason>,
    /// When the operation reached a terminal status.
    pub finalized_at: Option<DateTime<Utc>>,
}

/// The active one-time code for an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: ChallengeId,
    pub operation_id: OperationId,
    pub code: VerificationCode,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    /// A code is accepted up to and including `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Terminal outcome of `validate`. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub operation_id: OperationId,
    pub success: bool,
    pub reason: Option<FailureReason>,
    pub validated_at: DateTime<Utc>,
}

// ─── Verification Code ───────────────────────────────────────────────────────

/// Number of digits in a one-time code.
pub const CODE_LENGTH: usize = 6;

/// A six-digit, zero-padded numeric one-time code.
///
/// `Debug` is redacted so codes never end up in logs by accident.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Build a code from its numeric value. Values above 999999 are reduced
    /// modulo 10^6.
    pub fn from_value(value: u32) -> Self {
        Self(format!("{:06}", value % 1_000_000))
    }

    /// Accepts exactly six ASCII digits.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == CODE_LENGTH && raw.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares against a submitted string without short-circuiting on the
    /// first differing byte.
    pub fn matches(&self, submitted: &str) -> bool {
        let expected = self.0.as_bytes();
        let given = submitted.as_bytes();
        if expected.len() != given.len() {
            return false;
        }
        expected
            .iter()
            .zip(given)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VerificationCode(******)")
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
