//! VerificationCoordinator: the operation → challenge → validate state
//! machine behind SCA flows.
//!
//! ```text
//!   create_operation        issue_challenge              validate
//!  ─────────────────▶ PENDING ───────────────▶ CHALLENGE_SENT ──┬──▶ VALIDATED
//!                        │      ▲          │                    └──▶ FAILED
//!                        │      └──────────┘ (re-issue supersedes)
//!                        └──▶ FAILED (DELIVERY_FAILED, from either open state)
//! ```
//!
//! The coordinator owns the operation table. External effects (code delivery,
//! challenge recording) happen outside the table lock; the transition to
//! CHALLENGE_SENT is only applied once both have succeeded. A failure of
//! either ends the attempt: there is no retry at this layer.
//!
//! `validate` is where the protocol meets the rendezvous primitive: the
//! terminal `ValidationResult` is published to the [`CorrelationRegistry`]
//! under the correlation id of the calling workflow step.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::channels::{IdentityVerificationChannel, NotificationChannel};
use crate::clock::{Clock, SystemClock};
use crate::code::{CodeGenerator, VerificationCodeGenerator};
use crate::error::VerificationError;
use crate::registry::{Completion, CorrelationRegistry};
use crate::types::{
    Challenge, ChallengeId, CorrelationId, FailureReason, OperationId, OperationStatus, Recipient,
    ValidationResult, VerificationCode, VerificationOperation,
};
use crate::workflow::StepOutcome;

/// Default challenge lifetime.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(300);

/// Public view of a freshly issued challenge. The code itself only travels
/// through the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub challenge_id: ChallengeId,
    pub operation_id: OperationId,
    pub expires_at: DateTime<Utc>,
}

struct OperationRecord {
    operation: VerificationOperation,
    challenge: Option<Challenge>,
}

impl OperationRecord {
    /// Last point in time the operation could still change.
    fn last_activity(&self) -> DateTime<Utc> {
        match (&self.operation.finalized_at, &self.challenge) {
            (Some(finalized_at), _) => *finalized_at,
            (None, Some(challenge)) => challenge.expires_at,
            (None, None) => self.operation.created_at,
        }
    }
}

pub struct VerificationCoordinator {
    operations: Mutex<HashMap<OperationId, OperationRecord>>,
    next_operation_id: AtomicU64,
    notifications: Arc<dyn NotificationChannel>,
    challenges: Arc<dyn IdentityVerificationChannel>,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    registry: Arc<CorrelationRegistry<StepOutcome>>,
    challenge_ttl: Duration,
}

impl VerificationCoordinator {
    pub fn new(
        notifications: Arc<dyn NotificationChannel>,
        challenges: Arc<dyn IdentityVerificationChannel>,
        registry: Arc<CorrelationRegistry<StepOutcome>>,
    ) -> Self {
        Self {
            operations: Mutex::new(HashMap::new()),
            next_operation_id: AtomicU64::new(1),
            notifications,
            challenges,
            codes: Arc::new(VerificationCodeGenerator),
            clock: Arc::new(SystemClock),
            registry,
            challenge_ttl: DEFAULT_CHALLENGE_TTL,
        }
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry<StepOutcome>> {
        &self.registry
    }

    pub fn challenge_ttl(&self) -> Duration {
        self.challenge_ttl
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<OperationId, OperationRecord>> {
        self.operations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a PENDING operation for `recipient`. No external side effect.
    pub fn create_operation(&self, recipient: Recipient) -> OperationId {
        let operation_id = OperationId(self.next_operation_id.fetch_add(1, Ordering::Relaxed));
        let operation = VerificationOperation {
            operation_id,
            status: OperationStatus::Pending,
            recipient,
            created_at: self.clock.now(),
            failure_reason: None,
            finalized_at: None,
        };

        tracing::info!(
            operation_id = %operation_id,
            recipient = %operation.recipient,
            "Created verification operation"
        );
        self.table().insert(
            operation_id,
            OperationRecord {
                operation,
                challenge: None,
            },
        );
        operation_id
    }

    /// Generate a code, deliver it, record the challenge and move the
    /// operation to CHALLENGE_SENT.
    ///
    /// A delivery or recording failure finalizes the operation as FAILED with
    /// `DeliveryFailed` and is returned as `ChannelDeliveryFailed`. Calling
    /// this again while CHALLENGE_SENT replaces the active challenge.
    pub async fn issue_challenge(
        &self,
        operation_id: OperationId,
    ) -> Result<IssuedChallenge, VerificationError> {
        let recipient = {
            let table = self.table();
            let record = table
                .get(&operation_id)
                .ok_or(VerificationError::UnknownOperation(operation_id))?;
            ensure_open(&record.operation)?;
            record.operation.recipient.clone()
        };

        let code = self.codes.generate();
        let created_at = self.clock.now();
        let expires_at = self.expiry_from(created_at);

        let receipt = match self.notifications.send_code(&recipient, &code).await {
            Ok(receipt) => receipt,
            Err(source) => {
                tracing::error!(
                    operation_id = %operation_id,
                    recipient = %recipient,
                    error = %source,
                    "Code delivery failed"
                );
                self.fail_delivery(operation_id);
                return Err(VerificationError::ChannelDeliveryFailed {
                    operation_id,
                    source,
                });
            }
        };

        let challenge_id = match self
            .challenges
            .record_challenge(operation_id, &code, expires_at)
            .await
        {
            Ok(challenge_id) => challenge_id,
            Err(source) => {
                tracing::error!(
                    operation_id = %operation_id,
                    error = %source,
                    "Challenge recording failed"
                );
                self.fail_delivery(operation_id);
                return Err(VerificationError::ChannelDeliveryFailed {
                    operation_id,
                    source,
                });
            }
        };

        let mut table = self.table();
        let record = table
            .get_mut(&operation_id)
            .ok_or(VerificationError::UnknownOperation(operation_id))?;
        // Re-checked: a concurrent validate may have finalized it meanwhile.
        ensure_open(&record.operation)?;

        let superseded = record.challenge.as_ref().map(|c| c.challenge_id);
        record.challenge = Some(Challenge {
            challenge_id,
            operation_id,
            code,
            created_at,
            expires_at,
        });
        record.operation.status = OperationStatus::ChallengeSent;
        drop(table);

        tracing::info!(
            operation_id = %operation_id,
            challenge_id = %challenge_id,
            message_id = %receipt.message_id,
            expires_at = %expires_at,
            superseded = ?superseded,
            "Challenge sent"
        );

        Ok(IssuedChallenge {
            challenge_id,
            operation_id,
            expires_at,
        })
    }

    /// Check `submitted` against the active challenge and finalize the
    /// operation, then publish the result for `correlation_id`.
    ///
    /// Mismatch and expiry are returned as `ValidationResult { success: false }`.
    /// Errors are reserved for calls that cannot transition at all.
    pub fn validate(
        &self,
        correlation_id: CorrelationId,
        operation_id: OperationId,
        submitted: &str,
    ) -> Result<ValidationResult, VerificationError> {
        let now = self.clock.now();

        let result = {
            let mut table = self.table();
            let record = table
                .get_mut(&operation_id)
                .ok_or(VerificationError::UnknownOperation(operation_id))?;

            match record.operation.status {
                OperationStatus::ChallengeSent => {}
                OperationStatus::Pending => {
                    return Err(VerificationError::NoActiveChallenge(operation_id))
                }
                status => {
                    return Err(VerificationError::AlreadyFinalized {
                        operation_id,
                        status,
                    })
                }
            }
            let challenge = record
                .challenge
                .as_ref()
                .ok_or(VerificationError::NoActiveChallenge(operation_id))?;

            let reason = if challenge.is_expired_at(now) {
                Some(FailureReason::Expired)
            } else if VerificationCode::parse(submitted).is_some()
                && challenge.code.matches(submitted)
            {
                None
            } else {
                Some(FailureReason::InvalidCode)
            };

            record.operation.status = match reason {
                None => OperationStatus::Validated,
                Some(_) => OperationStatus::Failed,
            };
            record.operation.failure_reason = reason;
            record.operation.finalized_at = Some(now);

            ValidationResult {
                operation_id,
                success: reason.is_none(),
                reason,
                validated_at: now,
            }
        };

        match result.reason {
            None => tracing::info!(operation_id = %operation_id, "Verification succeeded"),
            Some(reason) => tracing::info!(
                operation_id = %operation_id,
                reason = reason.as_str(),
                "Verification failed"
            ),
        }

        let completion = self
            .registry
            .complete(correlation_id, StepOutcome::Validated(result.clone()));
        if completion != Completion::Delivered {
            tracing::debug!(
                correlation_id = %correlation_id,
                operation_id = %operation_id,
                ?completion,
                "Validation result had no waiting caller"
            );
        }

        Ok(result)
    }

    /// Snapshot of an operation.
    pub fn operation(&self, operation_id: OperationId) -> Option<VerificationOperation> {
        self.table()
            .get(&operation_id)
            .map(|record| record.operation.clone())
    }

    pub fn operation_count(&self) -> usize {
        self.table().len()
    }

    /// Drop operations nobody can act on any more.
    ///
    /// Terminal operations go once they were finalized more than `older_than`
    /// ago. Open ones go once their challenge expired (or, without a
    /// challenge, once they were created) more than `older_than` ago; their
    /// status is left as it was.
    pub fn prune_finalized(&self, older_than: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| self.clock.now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut table = self.table();
        let before = table.len();
        table.retain(|_, record| record.last_activity() >= cutoff);
        let pruned = before - table.len();
        drop(table);

        if pruned > 0 {
            tracing::debug!(pruned, "Pruned stale verification operations");
        }
        pruned
    }

    /// Finalize an open operation whose code could not be delivered.
    fn fail_delivery(&self, operation_id: OperationId) {
        let now = self.clock.now();
        let mut table = self.table();
        let Some(record) = table.get_mut(&operation_id) else {
            return;
        };
        // A concurrent validate may have finalized it meanwhile.
        if record.operation.status.is_terminal() {
            return;
        }
        record.operation.status = OperationStatus::Failed;
        record.operation.failure_reason = Some(FailureReason::DeliveryFailed);
        record.operation.finalized_at = Some(now);
    }

    fn expiry_from(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.challenge_ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn ensure_open(operation: &VerificationOperation) -> Result<(), VerificationError> {
    if operation.status.is_terminal() {
        return Err(VerificationError::AlreadyFinalized {
            operation_id: operation.operation_id,
            status: operation.status,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{DeliveryReceipt, InMemoryChallengeLedger, LoggingNotificationChannel};
    use crate::clock::ManualClock;
    use crate::error::ChannelError;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Hands out a fixed sequence of codes.
    struct ScriptedCodes(Mutex<VecDeque<u32>>);

    impl ScriptedCodes {
        fn new(values: &[u32]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(values.iter().copied().collect())))
        }
    }

    impl CodeGenerator for ScriptedCodes {
        fn generate(&self) -> VerificationCode {
            let value = self.0.lock().unwrap().pop_front().unwrap_or(0);
            VerificationCode::from_value(value)
        }
    }

    struct DownNotifications;

    #[async_trait]
    impl NotificationChannel for DownNotifications {
        async fn send_code(
            &self,
            _recipient: &Recipient,
            _code: &VerificationCode,
        ) -> Result<DeliveryReceipt, ChannelError> {
            Err(ChannelError::new("notification", "HTTP 503"))
        }
    }

    /// Fails the first delivery, then recovers.
    #[derive(Default)]
    struct FlakyNotifications {
        calls: AtomicU64,
    }

    #[async_trait]
    impl NotificationChannel for FlakyNotifications {
        async fn send_code(
            &self,
            _recipient: &Recipient,
            _code: &VerificationCode,
        ) -> Result<DeliveryReceipt, ChannelError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ChannelError::new("notification", "HTTP 503"));
            }
            Ok(DeliveryReceipt {
                message_id: uuid::Uuid::new_v4(),
                delivered_at: Utc::now(),
            })
        }
    }

    struct Fixture {
        coordinator: VerificationCoordinator,
        ledger: Arc<InMemoryChallengeLedger>,
        clock: Arc<ManualClock>,
        registry: Arc<CorrelationRegistry<StepOutcome>>,
    }

    fn fixture_with(notifications: Arc<dyn NotificationChannel>, codes: &[u32]) -> Fixture {
        let ledger = Arc::new(InMemoryChallengeLedger::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = Arc::new(CorrelationRegistry::new());
        let coordinator =
            VerificationCoordinator::new(notifications, ledger.clone(), registry.clone())
                .with_clock(clock.clone())
                .with_code_generator(ScriptedCodes::new(codes))
                .with_challenge_ttl(Duration::from_secs(300));
        Fixture {
            coordinator,
            ledger,
            clock,
            registry,
        }
    }

    fn fixture(codes: &[u32]) -> Fixture {
        fixture_with(Arc::new(LoggingNotificationChannel::new()), codes)
    }

    fn status(f: &Fixture, op: OperationId) -> OperationStatus {
        f.coordinator.operation(op).unwrap().status
    }

    #[tokio::test]
    async fn test_issue_challenge_moves_to_challenge_sent() {
        let f = fixture(&[42]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));
        assert_eq!(status(&f, op), OperationStatus::Pending);

        let issued = f.coordinator.issue_challenge(op).await.unwrap();
        assert_eq!(issued.operation_id, op);
        assert_eq!(
            issued.expires_at,
            f.clock.now() + chrono::Duration::seconds(300)
        );
        assert_eq!(status(&f, op), OperationStatus::ChallengeSent);
        assert_eq!(f.ledger.recorded()[0].challenge_id, issued.challenge_id);
    }

    #[tokio::test]
    async fn test_correct_code_validates_and_completes_waiter() {
        let f = fixture(&[42]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));
        f.coordinator.issue_challenge(op).await.unwrap();

        let handle = f.registry.register(CorrelationId(900)).unwrap();
        let result = f
            .coordinator
            .validate(CorrelationId(900), op, "000042")
            .unwrap();
        assert!(result.success);
        assert_eq!(result.reason, None);
        assert_eq!(status(&f, op), OperationStatus::Validated);

        let outcome = f
            .registry
            .wait(handle, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::Validated(r) if r == result));
    }

    #[tokio::test]
    async fn test_wrong_code_fails_with_invalid_code() {
        let f = fixture(&[42]);
        let op = f.coordinator.create_operation(Recipient::sms("+34600000000"));
        f.coordinator.issue_challenge(op).await.unwrap();

        let result = f
            .coordinator
            .validate(CorrelationId(1), op, "000043")
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::InvalidCode));

        let operation = f.coordinator.operation(op).unwrap();
        assert_eq!(operation.status, OperationStatus::Failed);
        assert_eq!(operation.failure_reason, Some(FailureReason::InvalidCode));
    }

    #[tokio::test]
    async fn test_malformed_code_is_invalid_not_error() {
        let f = fixture(&[42]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));
        f.coordinator.issue_challenge(op).await.unwrap();

        let result = f.coordinator.validate(CorrelationId(1), op, "42").unwrap();
        assert_eq!(result.reason, Some(FailureReason::InvalidCode));
    }

    #[tokio::test]
    async fn test_expired_challenge_fails_even_with_correct_code() {
        let f = fixture(&[42]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));
        f.coordinator.issue_challenge(op).await.unwrap();

        f.clock.advance(chrono::Duration::seconds(301));
        let result = f
            .coordinator
            .validate(CorrelationId(1), op, "000042")
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::Expired));
        assert_eq!(status(&f, op), OperationStatus::Failed);
    }

    #[tokio::test]
    async fn test_code_accepted_at_exact_expiry() {
        let f = fixture(&[42]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));
        let issued = f.coordinator.issue_challenge(op).await.unwrap();

        f.clock.set(issued.expires_at);
        let result = f
            .coordinator
            .validate(CorrelationId(1), op, "000042")
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_validate_before_challenge_is_rejected() {
        let f = fixture(&[42]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));

        let err = f
            .coordinator
            .validate(CorrelationId(1), op, "000042")
            .unwrap_err();
        assert!(matches!(err, VerificationError::NoActiveChallenge(id) if id == op));
        assert_eq!(status(&f, op), OperationStatus::Pending);
    }

    #[tokio::test]
    async fn test_terminal_operation_never_changes() {
        let f = fixture(&[42, 7]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));
        f.coordinator.issue_challenge(op).await.unwrap();
        f.coordinator
            .validate(CorrelationId(1), op, "999999")
            .unwrap();

        let err = f
            .coordinator
            .validate(CorrelationId(2), op, "000042")
            .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::AlreadyFinalized {
                status: OperationStatus::Failed,
                ..
            }
        ));

        let err = f.coordinator.issue_challenge(op).await.unwrap_err();
        assert!(matches!(err, VerificationError::AlreadyFinalized { .. }));
        assert_eq!(status(&f, op), OperationStatus::Failed);
    }

    #[tokio::test]
    async fn test_reissue_supersedes_previous_code() {
        let f = fixture(&[111_111, 222_222]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));
        let first = f.coordinator.issue_challenge(op).await.unwrap();
        let second = f.coordinator.issue_challenge(op).await.unwrap();
        assert_ne!(first.challenge_id, second.challenge_id);

        let result = f
            .coordinator
            .validate(CorrelationId(1), op, "111111")
            .unwrap();
        assert_eq!(result.reason, Some(FailureReason::InvalidCode));
    }

    #[tokio::test]
    async fn test_delivery_failure_finalizes_operation() {
        let f = fixture_with(Arc::new(DownNotifications), &[42]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));

        let err = f.coordinator.issue_challenge(op).await.unwrap_err();
        match err {
            VerificationError::ChannelDeliveryFailed {
                operation_id,
                source,
            } => {
                assert_eq!(operation_id, op);
                assert_eq!(source.channel, "notification");
            }
            other => panic!("expected ChannelDeliveryFailed, got {other:?}"),
        }
        let operation = f.coordinator.operation(op).unwrap();
        assert_eq!(operation.status, OperationStatus::Failed);
        assert_eq!(operation.failure_reason, Some(FailureReason::DeliveryFailed));
        assert!(operation.finalized_at.is_some());
        assert!(f.ledger.recorded().is_empty());

        let err = f
            .coordinator
            .validate(CorrelationId(1), op, "000042")
            .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::AlreadyFinalized {
                status: OperationStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_no_retry_after_delivery_failure() {
        let f = fixture_with(Arc::new(FlakyNotifications::default()), &[42, 43]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));

        f.coordinator.issue_challenge(op).await.unwrap_err();
        let err = f.coordinator.issue_challenge(op).await.unwrap_err();
        assert!(matches!(err, VerificationError::AlreadyFinalized { .. }));
        assert_eq!(status(&f, op), OperationStatus::Failed);
        assert!(f.ledger.recorded().is_empty());

        // A fresh operation goes through once the channel recovers.
        let next = f.coordinator.create_operation(Recipient::email("a@b.com"));
        f.coordinator.issue_challenge(next).await.unwrap();
        assert_eq!(status(&f, next), OperationStatus::ChallengeSent);
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let f = fixture(&[]);
        let err = f
            .coordinator
            .issue_challenge(OperationId(404))
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::UnknownOperation(OperationId(404))));
        assert!(f.coordinator.operation(OperationId(404)).is_none());
    }

    #[tokio::test]
    async fn test_validate_without_waiter_still_returns_result() {
        let f = fixture(&[42]);
        let op = f.coordinator.create_operation(Recipient::email("a@b.com"));
        f.coordinator.issue_challenge(op).await.unwrap();

        let result = f
            .coordinator
            .validate(CorrelationId(12345), op, "000042")
            .unwrap();
        assert!(result.success);
        assert_eq!(f.registry.stats().orphaned_completions, 1);
    }

    #[tokio::test]
    async fn test_prune_finalized_keeps_open_operations() {
        let f = fixture(&[42, 7]);
        let done = f.coordinator.create_operation(Recipient::email("done@b.com"));
        f.coordinator.issue_challenge(done).await.unwrap();
        f.coordinator
            .validate(CorrelationId(1), done, "000042")
            .unwrap();
        let open = f.coordinator.create_operation(Recipient::email("open@b.com"));
        f.coordinator.issue_challenge(open).await.unwrap();

        assert_eq!(f.coordinator.prune_finalized(Duration::from_secs(60)), 0);
        f.clock.advance(chrono::Duration::seconds(120));
        assert_eq!(f.coordinator.prune_finalized(Duration::from_secs(60)), 1);

        assert!(f.coordinator.operation(open).is_some());
        assert!(f.coordinator.operation(done).is_none());
    }

    #[tokio::test]
    async fn test_prune_collects_abandoned_open_operations() {
        let codes: Vec<u32> = (0..1000).collect();
        let f = fixture(&codes);
        for i in 0..1000 {
            let op = f
                .coordinator
                .create_operation(Recipient::email(format!("user{i}@b.com")));
            f.coordinator.issue_challenge(op).await.unwrap();
        }
        let never_issued = f.coordinator.create_operation(Recipient::email("late@b.com"));

        // Challenges expire at +300s; nothing is past the retention window yet.
        f.clock.advance(chrono::Duration::seconds(3000));
        assert_eq!(f.coordinator.prune_finalized(Duration::from_secs(3600)), 0);

        f.clock.advance(chrono::Duration::days(365));
        assert_eq!(f.coordinator.prune_finalized(Duration::from_secs(3600)), 1001);
        assert_eq!(f.coordinator.operation_count(), 0);
        assert!(f.coordinator.operation(never_issued).is_none());
    }

    #[tokio::test]
    async fn test_prune_leaves_status_of_recent_open_operations() {
        let f = fixture(&[42]);
        let sent = f.coordinator.create_operation(Recipient::email("a@b.com"));
        f.coordinator.issue_challenge(sent).await.unwrap();
        let pending = f.coordinator.create_operation(Recipient::email("b@b.com"));

        // Pending was created 400s ago; the challenge expired 100s ago.
        f.clock.advance(chrono::Duration::seconds(400));
        assert_eq!(f.coordinator.prune_finalized(Duration::from_secs(600)), 0);
        assert_eq!(status(&f, sent), OperationStatus::ChallengeSent);
        assert_eq!(status(&f, pending), OperationStatus::Pending);

        assert_eq!(f.coordinator.prune_finalized(Duration::from_secs(60)), 2);
    }
}
