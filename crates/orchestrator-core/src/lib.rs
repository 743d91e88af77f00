//! orchestrator-core: correlation registry and SCA verification protocol.
//!
//! A synchronous caller starts a workflow process and blocks on its result
//! through the [`registry::CorrelationRegistry`]; independently, the
//! [`workflow::VerificationWorker`] drives the
//! [`verification::VerificationCoordinator`] through
//! operation → challenge → validate and publishes the terminal outcome under
//! the same correlation id.

pub mod channels;
pub mod clock;
pub mod code;
pub mod config;
pub mod error;
pub mod janitor;
pub mod registry;
pub mod types;
pub mod verification;
pub mod workflow;

pub use config::OrchestratorConfig;
pub use error::{ChannelError, GatewayError, OrchestratorError, RegistryError, VerificationError};
pub use registry::{Completion, CorrelationRegistry, RegistryStats, WaitHandle};
pub use types::*;
pub use verification::{IssuedChallenge, VerificationCoordinator};
