//! Workflow integration: typed process contracts, the gateway seam, an
//! in-process engine, the step worker and the caller-side runner.

pub mod engine;
pub mod gateway;
pub mod runner;
pub mod steps;
pub mod worker;

pub use engine::{InProcessEngine, StepHandler};
pub use gateway::WorkflowStepGateway;
pub use runner::{ChallengeReceipt, ProcessRunner, ValidationReceipt};
pub use steps::{ProcessRequest, StepOutcome};
pub use worker::VerificationWorker;
