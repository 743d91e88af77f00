//! VerificationWorker: executes the steps of the verification processes.
//!
//! | Process                       | Steps                                          |
//! |-------------------------------|------------------------------------------------|
//! | `send-verification-{email,sms}` | create-sca-operation → send-sca-challenge    |
//! | `validate-verification-code`  | validate-sca-code                              |
//!
//! Every run ends by publishing exactly one `StepOutcome` under the process
//! key. `validate` publishes its own result; all other outcomes are published
//! here.

use async_trait::async_trait;
use std::sync::Arc;

use super::engine::StepHandler;
use super::steps::{ProcessRequest, StepOutcome};
use crate::error::VerificationError;
use crate::registry::CorrelationRegistry;
use crate::types::{CorrelationId, OperationId, Recipient};
use crate::verification::VerificationCoordinator;

pub struct VerificationWorker {
    coordinator: Arc<VerificationCoordinator>,
}

impl VerificationWorker {
    pub fn new(coordinator: Arc<VerificationCoordinator>) -> Self {
        Self { coordinator }
    }

    fn registry(&self) -> &Arc<CorrelationRegistry<StepOutcome>> {
        self.coordinator.registry()
    }

    async fn send_verification(&self, correlation_id: CorrelationId, recipient: Recipient) {
        tracing::debug!(
            correlation_id = %correlation_id,
            recipient = %recipient,
            "create-sca-operation-task"
        );
        let operation_id = self.coordinator.create_operation(recipient);

        tracing::debug!(
            correlation_id = %correlation_id,
            operation_id = %operation_id,
            "send-sca-challenge-task"
        );
        let outcome = match self.coordinator.issue_challenge(operation_id).await {
            Ok(issued) => StepOutcome::ChallengeIssued {
                operation_id: issued.operation_id,
                challenge_id: issued.challenge_id,
                expires_at: issued.expires_at,
            },
            Err(error) => self.failed(correlation_id, Some(operation_id), error),
        };
        self.registry().complete(correlation_id, outcome);
    }

    fn validate_code(&self, correlation_id: CorrelationId, operation_id: OperationId, code: &str) {
        tracing::debug!(
            correlation_id = %correlation_id,
            operation_id = %operation_id,
            "validate-sca-code-task"
        );
        if let Err(error) = self.coordinator.validate(correlation_id, operation_id, code) {
            let outcome = self.failed(correlation_id, Some(operation_id), error);
            self.registry().complete(correlation_id, outcome);
        }
    }

    fn failed(
        &self,
        correlation_id: CorrelationId,
        operation_id: Option<OperationId>,
        error: VerificationError,
    ) -> StepOutcome {
        tracing::warn!(
            correlation_id = %correlation_id,
            operation_id = ?operation_id.map(|id| id.0),
            error = %error,
            "Verification step failed"
        );
        StepOutcome::Failed {
            operation_id,
            error,
        }
    }
}

#[async_trait]
impl StepHandler for VerificationWorker {
    async fn execute(&self, correlation_id: CorrelationId, request: ProcessRequest) {
        match request {
            ProcessRequest::SendVerification { recipient } => {
                self.send_verification(correlation_id, recipient).await
            }
            ProcessRequest::ValidateCode { operation_id, code } => {
                self.validate_code(correlation_id, operation_id, &code)
            }
        }
    }
}
