//! ProcessRunner: the caller side of a verification process.
//!
//! `reserve → register → start → wait`. Registering before `start` means a
//! worker can never complete ahead of the waiter. If `start` fails the waiter
//! is removed again; if the wait times out the process keeps running and its
//! late completion is discarded by the registry.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::gateway::WorkflowStepGateway;
use super::steps::{ProcessRequest, StepOutcome};
use crate::error::OrchestratorError;
use crate::registry::CorrelationRegistry;
use crate::types::{ChallengeId, CorrelationId, OperationId, Recipient, ValidationResult};

/// A challenge issued by a `send-verification-*` process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeReceipt {
    pub process_instance_key: CorrelationId,
    pub operation_id: OperationId,
    pub challenge_id: ChallengeId,
    pub expires_at: DateTime<Utc>,
}

/// A verdict from a `validate-verification-code` process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReceipt {
    pub process_instance_key: CorrelationId,
    pub result: ValidationResult,
}

pub struct ProcessRunner {
    gateway: Arc<dyn WorkflowStepGateway>,
    registry: Arc<CorrelationRegistry<StepOutcome>>,
    waiter_timeout: Duration,
}

impl ProcessRunner {
    pub fn new(
        gateway: Arc<dyn WorkflowStepGateway>,
        registry: Arc<CorrelationRegistry<StepOutcome>>,
        waiter_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            registry,
            waiter_timeout,
        }
    }

    pub fn waiter_timeout(&self) -> Duration {
        self.waiter_timeout
    }

    /// Start a process and block until it publishes its outcome or the waiter
    /// timeout elapses. `Failed` and `Aborted` outcomes come back as errors.
    pub async fn start_and_wait(
        &self,
        request: ProcessRequest,
    ) -> Result<(CorrelationId, StepOutcome), OrchestratorError> {
        let correlation_id = self.gateway.reserve();
        let process_key = request.process_key();
        let handle = self.registry.register(correlation_id)?;

        if let Err(e) = self.gateway.start(correlation_id, request).await {
            self.registry.remove(correlation_id);
            tracing::error!(
                correlation_id = %correlation_id,
                process_key,
                error = %e,
                "Failed to start process instance"
            );
            return Err(e.into());
        }

        let outcome = self.registry.wait(handle, self.waiter_timeout).await?;
        tracing::debug!(
            correlation_id = %correlation_id,
            process_key,
            outcome = outcome.kind(),
            "Process instance finished"
        );

        match outcome {
            StepOutcome::Failed { error, .. } => Err(error.into()),
            StepOutcome::Aborted { reason } => Err(OrchestratorError::StepFailed(reason)),
            outcome => Ok((correlation_id, outcome)),
        }
    }

    pub async fn send_verification(
        &self,
        recipient: Recipient,
    ) -> Result<ChallengeReceipt, OrchestratorError> {
        let (key, outcome) = self
            .start_and_wait(ProcessRequest::SendVerification { recipient })
            .await?;
        match outcome {
            StepOutcome::ChallengeIssued {
                operation_id,
                challenge_id,
                expires_at,
            } => Ok(ChallengeReceipt {
                process_instance_key: key,
                operation_id,
                challenge_id,
                expires_at,
            }),
            other => Err(OrchestratorError::UnexpectedOutcome(other.kind().to_string())),
        }
    }

    pub async fn validate_code(
        &self,
        operation_id: OperationId,
        code: String,
    ) -> Result<ValidationReceipt, OrchestratorError> {
        let (key, outcome) = self
            .start_and_wait(ProcessRequest::ValidateCode { operation_id, code })
            .await?;
        match outcome {
            StepOutcome::Validated(result) => Ok(ValidationReceipt {
                process_instance_key: key,
                result,
            }),
            other => Err(OrchestratorError::UnexpectedOutcome(other.kind().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GatewayError, RegistryError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Gateway that never runs anything, or refuses to start.
    struct StubGateway {
        next: AtomicU64,
        refuse: bool,
    }

    #[async_trait]
    impl WorkflowStepGateway for StubGateway {
        fn reserve(&self) -> CorrelationId {
            CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
        }

        async fn start(
            &self,
            _correlation_id: CorrelationId,
            _request: ProcessRequest,
        ) -> Result<(), GatewayError> {
            if self.refuse {
                Err(GatewayError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn runner(refuse: bool) -> (ProcessRunner, Arc<CorrelationRegistry<StepOutcome>>) {
        let registry = Arc::new(CorrelationRegistry::new());
        let gateway = Arc::new(StubGateway {
            next: AtomicU64::new(100),
            refuse,
        });
        (
            ProcessRunner::new(gateway, registry.clone(), Duration::from_secs(30)),
            registry,
        )
    }

    #[tokio::test]
    async fn test_start_failure_removes_waiter() {
        let (runner, registry) = runner(true);
        let err = runner
            .send_verification(Recipient::email("a@b.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Gateway(_)));
        assert_eq!(err.http_status(), 503);
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_process_times_out() {
        let (runner, registry) = runner(false);
        let err = runner
            .validate_code(OperationId(1), "123456".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Registry(RegistryError::Timeout { .. })
        ));
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_completion_from_another_task_is_returned() {
        let (runner, registry) = runner(false);
        tokio::spawn(async move {
            // The stub reserves 100 first.
            while !registry.is_pending(CorrelationId(100)) {
                tokio::task::yield_now().await;
            }
            registry.complete(
                CorrelationId(100),
                StepOutcome::ChallengeIssued {
                    operation_id: OperationId(5),
                    challenge_id: ChallengeId(6),
                    expires_at: Utc::now(),
                },
            );
        });

        let receipt = runner
            .send_verification(Recipient::sms("+34600000000"))
            .await
            .unwrap();
        assert_eq!(receipt.process_instance_key, CorrelationId(100));
        assert_eq!(receipt.operation_id, OperationId(5));
        assert_eq!(receipt.challenge_id, ChallengeId(6));
    }

    #[tokio::test]
    async fn test_mismatched_outcome_is_unexpected() {
        let (runner, registry) = runner(false);
        tokio::spawn(async move {
            while !registry.is_pending(CorrelationId(100)) {
                tokio::task::yield_now().await;
            }
            registry.complete(
                CorrelationId(100),
                StepOutcome::ChallengeIssued {
                    operation_id: OperationId(5),
                    challenge_id: ChallengeId(6),
                    expires_at: Utc::now(),
                },
            );
        });

        let err = runner
            .validate_code(OperationId(5), "123456".into())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnexpectedOutcome(_)));
    }
}
