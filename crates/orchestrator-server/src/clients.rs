//! HTTP clients for the notification and SCA services.
//!
//! Every call carries a fresh `Idempotency-Key` so the downstream services
//! can deduplicate retries issued by their own gateways.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use orchestrator_core::channels::{DeliveryReceipt, IdentityVerificationChannel, NotificationChannel};
use orchestrator_core::{
    ChallengeId, ChannelError, DeliveryChannel, OperationId, Recipient, VerificationCode,
};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const EMAIL_SENDER: &str = "no-reply@orchestrator.local";
const EMAIL_SUBJECT: &str = "Verification code";

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Building HTTP client")
}

fn message_body(code: &VerificationCode) -> String {
    format!("Your verification code is: {}", code.as_str())
}

async fn error_from_response(channel: &'static str, response: reqwest::Response) -> ChannelError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ChannelError::new(channel, format!("HTTP {status}: {body}"))
}

// ---------------------------------------------------------------------------
// Notification service
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SmsRequest<'a> {
    phone_number: &'a str,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: Option<String>,
}

#[derive(Clone)]
pub struct HttpNotificationChannel {
    client: reqwest::Client,
    base_path: String,
}

impl HttpNotificationChannel {
    pub fn new(base_path: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_path: base_path.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NotificationChannel for HttpNotificationChannel {
    async fn send_code(
        &self,
        recipient: &Recipient,
        code: &VerificationCode,
    ) -> Result<DeliveryReceipt, ChannelError> {
        let url = format!(
            "{}/api/v1/notifications/{}",
            self.base_path,
            recipient.channel.as_str()
        );
        let request = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_KEY_HEADER, Uuid::new_v4().to_string());
        let request = match recipient.channel {
            DeliveryChannel::Email => request.json(&EmailRequest {
                from: EMAIL_SENDER,
                to: &recipient.address,
                subject: EMAIL_SUBJECT,
                html: message_body(code),
            }),
            DeliveryChannel::Sms => request.json(&SmsRequest {
                phone_number: &recipient.address,
                message: message_body(code),
            }),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::new("notification", e.to_string()))?;
        if !response.status().is_success() {
            return Err(error_from_response("notification", response).await);
        }

        let body: SendResponse = response.json().await.unwrap_or_default();
        let message_id = body
            .message_id
            .and_then(|id| Uuid::parse_str(&id).ok())
            .unwrap_or_else(Uuid::new_v4);
        tracing::debug!(recipient = %recipient, message_id = %message_id, "Notification sent");

        Ok(DeliveryReceipt {
            message_id,
            delivered_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// SCA service
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeRequest<'a> {
    challenge_code: &'a str,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeResponse {
    challenge_id: u64,
}

#[derive(Clone)]
pub struct HttpScaChannel {
    client: reqwest::Client,
    base_path: String,
}

impl HttpScaChannel {
    pub fn new(base_path: &str) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_path: base_path.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityVerificationChannel for HttpScaChannel {
    async fn record_challenge(
        &self,
        operation_id: OperationId,
        code: &VerificationCode,
        expires_at: DateTime<Utc>,
    ) -> Result<ChallengeId, ChannelError> {
        let url = format!(
            "{}/api/v1/operations/{}/challenges",
            self.base_path, operation_id
        );
        let response = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_KEY_HEADER, Uuid::new_v4().to_string())
            .json(&ChallengeRequest {
                challenge_code: code.as_str(),
                created_at: Utc::now(),
                expires_at,
            })
            .send()
            .await
            .map_err(|e| ChannelError::new("sca", e.to_string()))?;
        if !response.status().is_success() {
            return Err(error_from_response("sca", response).await);
        }

        let body: ChallengeResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::new("sca", format!("invalid challenge response: {e}")))?;
        Ok(ChallengeId(body.challenge_id))
    }
}
