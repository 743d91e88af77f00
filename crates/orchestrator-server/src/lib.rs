//! orchestrator-server: REST surface for workflow-backed SCA verification.

pub mod clients;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
