//! POST /api/v1/notifications/{email,sms}/{send-verification,validate-code}
//!
//! Each request starts a verification process and blocks until the process
//! publishes its outcome or the waiter timeout elapses. A validate route only
//! sees operations issued over its own channel.

use axum::{extract::Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orchestrator_core::{
    DeliveryChannel, FailureReason, OperationId, OperationStatus, Recipient, VerificationError,
};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendVerificationRequest {
    pub to: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationResponse {
    pub process_instance_key: u64,
    pub operation_id: u64,
    pub challenge_id: u64,
    pub expires_at: DateTime<Utc>,
    pub status: OperationStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCodeRequest {
    pub id_operation: u64,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCodeResponse {
    pub operation_id: u64,
    pub validation_status: bool,
    pub reason: Option<FailureReason>,
}

pub async fn send_email_verification(
    Extension(state): Extension<AppState>,
    Json(request): Json<SendVerificationRequest>,
) -> Result<Json<SendVerificationResponse>, AppError> {
    let to = required_recipient(&request.to)?;
    send_verification(&state, Recipient::email(to)).await
}

pub async fn send_sms_verification(
    Extension(state): Extension<AppState>,
    Json(request): Json<SendVerificationRequest>,
) -> Result<Json<SendVerificationResponse>, AppError> {
    let to = required_recipient(&request.to)?;
    send_verification(&state, Recipient::sms(to)).await
}

pub async fn validate_email_code(
    Extension(state): Extension<AppState>,
    Json(request): Json<ValidateCodeRequest>,
) -> Result<Json<ValidateCodeResponse>, AppError> {
    validate_code(&state, DeliveryChannel::Email, request).await
}

pub async fn validate_sms_code(
    Extension(state): Extension<AppState>,
    Json(request): Json<ValidateCodeRequest>,
) -> Result<Json<ValidateCodeResponse>, AppError> {
    validate_code(&state, DeliveryChannel::Sms, request).await
}

fn required_recipient(to: &str) -> Result<&str, AppError> {
    let to = to.trim();
    if to.is_empty() {
        return Err(AppError::BadRequest("'to' must not be empty".into()));
    }
    Ok(to)
}

async fn send_verification(
    state: &AppState,
    recipient: Recipient,
) -> Result<Json<SendVerificationResponse>, AppError> {
    tracing::info!(recipient = %recipient, "Sending verification");
    let receipt = state.runner.send_verification(recipient).await?;
    Ok(Json(SendVerificationResponse {
        process_instance_key: receipt.process_instance_key.0,
        operation_id: receipt.operation_id.0,
        challenge_id: receipt.challenge_id.0,
        expires_at: receipt.expires_at,
        status: OperationStatus::ChallengeSent,
    }))
}

async fn validate_code(
    state: &AppState,
    channel: DeliveryChannel,
    request: ValidateCodeRequest,
) -> Result<Json<ValidateCodeResponse>, AppError> {
    let operation_id = OperationId(request.id_operation);
    tracing::info!(
        operation_id = %operation_id,
        channel = channel.as_str(),
        "Validating verification code"
    );
    // Unknown ids fall through to the process, which reports them itself.
    if let Some(operation) = state.coordinator.operation(operation_id) {
        if operation.recipient.channel != channel {
            tracing::debug!(
                operation_id = %operation_id,
                issued_over = operation.recipient.channel.as_str(),
                channel = channel.as_str(),
                "Operation belongs to another channel"
            );
            return Err(AppError::Orchestrator(
                VerificationError::UnknownOperation(operation_id).into(),
            ));
        }
    }
    let receipt = state
        .runner
        .validate_code(operation_id, request.code)
        .await?;
    Ok(Json(ValidateCodeResponse {
        operation_id: receipt.result.operation_id.0,
        validation_status: receipt.result.success,
        reason: receipt.result.reason,
    }))
}
