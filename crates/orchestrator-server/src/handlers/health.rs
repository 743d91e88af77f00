//! GET /health: liveness plus registry counters.

use axum::{extract::Extension, Json};
use orchestrator_core::RegistryStats;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub operations: usize,
    pub registry: RegistryStats,
}

pub async fn health(Extension(state): Extension<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        operations: state.coordinator.operation_count(),
        registry: state.registry.stats(),
    })
}
