//! External channel contracts consumed by the verification coordinator.
//!
//! The notification service delivers a code to the recipient; the SCA service
//! records the server-side challenge. Production implementations talk HTTP
//! (see the server crate); the in-memory ones here back development runs and
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::types::{ChallengeId, OperationId, Recipient, VerificationCode};

/// Acknowledgement from the notification service.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub message_id: Uuid,
    pub delivered_at: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_code(
        &self,
        recipient: &Recipient,
        code: &VerificationCode,
    ) -> Result<DeliveryReceipt, ChannelError>;
}

#[async_trait]
pub trait IdentityVerificationChannel: Send + Sync {
    async fn record_challenge(
        &self,
        operation_id: OperationId,
        code: &VerificationCode,
        expires_at: DateTime<Utc>,
    ) -> Result<ChallengeId, ChannelError>;
}

/// How many entries the in-memory channels retain by default. The oldest
/// entry is dropped first.
pub const DEFAULT_RETAINED: usize = 1024;

// ---------------------------------------------------------------------------
// LoggingNotificationChannel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LastCodes {
    by_address: HashMap<String, VerificationCode>,
    order: VecDeque<String>,
}

/// Development notification channel: logs deliveries and remembers the last
/// code sent to each of the most recent `capacity` addresses.
///
/// The plaintext code is only logged at `trace`.
#[derive(Debug)]
pub struct LoggingNotificationChannel {
    last_codes: Mutex<LastCodes>,
    capacity: usize,
}

impl Default for LoggingNotificationChannel {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED)
    }
}

impl LoggingNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            last_codes: Mutex::new(LastCodes::default()),
            capacity: capacity.max(1),
        }
    }

    /// Last code delivered to `address`, if still retained.
    pub fn last_code_for(&self, address: &str) -> Option<VerificationCode> {
        self.last_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_address
            .get(address)
            .cloned()
    }

    /// Number of addresses currently retained.
    pub fn delivery_count(&self) -> usize {
        self.last_codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_address
            .len()
    }

    fn remember(&self, address: &str, code: &VerificationCode) {
        let mut last = self.last_codes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = last.by_address.get_mut(address) {
            *existing = code.clone();
            return;
        }
        while last.order.len() >= self.capacity {
            let Some(oldest) = last.order.pop_front() else {
                break;
            };
            last.by_address.remove(&oldest);
        }
        last.order.push_back(address.to_string());
        last.by_address.insert(address.to_string(), code.clone());
    }
}

#[async_trait]
impl NotificationChannel for LoggingNotificationChannel {
    async fn send_code(
        &self,
        recipient: &Recipient,
        code: &VerificationCode,
    ) -> Result<DeliveryReceipt, ChannelError> {
        let receipt = DeliveryReceipt {
            message_id: Uuid::new_v4(),
            delivered_at: Utc::now(),
        };
        self.remember(&recipient.address, code);

        tracing::debug!(
            recipient = %recipient,
            message_id = %receipt.message_id,
            "LoggingNotificationChannel: code delivered (development channel)"
        );
        tracing::trace!(
            message_id = %receipt.message_id,
            code = code.as_str(),
            "LoggingNotificationChannel: delivered code"
        );
        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// InMemoryChallengeLedger
// ---------------------------------------------------------------------------

/// A challenge as the SCA service saw it.
#[derive(Debug, Clone)]
pub struct RecordedChallenge {
    pub challenge_id: ChallengeId,
    pub operation_id: OperationId,
    pub expires_at: DateTime<Utc>,
}

/// Development SCA channel: allocates challenge ids and keeps the most
/// recent `capacity` records.
#[derive(Debug)]
pub struct InMemoryChallengeLedger {
    next_id: AtomicU64,
    recorded: Mutex<VecDeque<RecordedChallenge>>,
    capacity: usize,
}

impl Default for InMemoryChallengeLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RETAINED)
    }
}

impl InMemoryChallengeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            recorded: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Retained records, oldest first.
    pub fn recorded(&self) -> Vec<RecordedChallenge> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IdentityVerificationChannel for InMemoryChallengeLedger {
    async fn record_challenge(
        &self,
        operation_id: OperationId,
        _code: &VerificationCode,
        expires_at: DateTime<Utc>,
    ) -> Result<ChallengeId, ChannelError> {
        let challenge_id = ChallengeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        if recorded.len() >= self.capacity {
            recorded.pop_front();
        }
        recorded.push_back(RecordedChallenge {
            challenge_id,
            operation_id,
            expires_at,
        });
        Ok(challenge_id)
    }
}
