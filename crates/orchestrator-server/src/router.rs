//! Router construction for the orchestrator server.

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the full axum router with all routes and shared state.
pub fn build_router(state: AppState) -> Router {
    let notifications = Router::new()
        .route(
            "/email/send-verification",
            post(handlers::notifications::send_email_verification),
        )
        .route(
            "/email/validate-code",
            post(handlers::notifications::validate_email_code),
        )
        .route(
            "/sms/send-verification",
            post(handlers::notifications::send_sms_verification),
        )
        .route(
            "/sms/validate-code",
            post(handlers::notifications::validate_sms_code),
        );

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/v1/notifications", notifications)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}
