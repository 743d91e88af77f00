//! WorkflowStepGateway: the seam between callers and the workflow engine.

use async_trait::async_trait;

use super::steps::ProcessRequest;
use crate::error::GatewayError;
use crate::types::CorrelationId;

/// Starts long-running processes.
///
/// Completion flows back out of band: whoever executes the final step calls
/// `CorrelationRegistry::complete` with the id the process was started under.
#[async_trait]
pub trait WorkflowStepGateway: Send + Sync {
    /// Allocate the key the next process instance will run under.
    ///
    /// Callers register their waiter for this id *before* calling `start`,
    /// so no completion can arrive ahead of the registration.
    fn reserve(&self) -> CorrelationId;

    /// Start a process instance under a previously reserved id.
    async fn start(
        &self,
        correlation_id: CorrelationId,
        request: ProcessRequest,
    ) -> Result<(), GatewayError>;
}
