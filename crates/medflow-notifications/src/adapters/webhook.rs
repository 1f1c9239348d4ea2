use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::json;
use sha2::Sha256;

use super::{NotificationAdapter, SendResult};
use crate::error::NotificationError;
use crate::provider::{ProviderConfig, ProviderKind};
use crate::types::Notification;

type HmacSha256 = Hmac<Sha256>;

/// Posts messages as JSON to an SMS gateway.
pub struct WebhookAdapter {
    http_client: Client,
}

impl WebhookAdapter {
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
        }
    }

    pub fn sign_payload(payload: &str, secret: &str) -> Result<String, NotificationError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl Default for WebhookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationAdapter for WebhookAdapter {
    async fn send(
        &self,
        config: &ProviderConfig,
        notification: &Notification,
    ) -> Result<SendResult, NotificationError> {
        let url = config
            .webhook_url
            .as_ref()
            .ok_or(NotificationError::InvalidConfig("Missing webhook_url".into()))?;

        let payload = json!({
            "notification_id": notification.id,
            "channel": notification.channel,
            "to": notification.destination,
            "body": notification.body,
            "created_at": notification.created_at
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
        });
        let payload_str = serde_json::to_string(&payload)
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let mut request = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json");

        if let Some(headers) = &config.webhook_headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        if let Some(secret) = &config.webhook_secret {
            let signature = Self::sign_payload(&payload_str, secret)?;
            request = request.header("X-Signature-256", format!("sha256={}", signature));
        }

        let response = request
            .body(payload_str)
            .send()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Ok(SendResult::failed(format!(
                "SMS gateway returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        // Gateways that answer with JSON may carry their own message id.
        let external_id = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message_id")
                    .or_else(|| v.get("id"))
                    .and_then(|id| id.as_str().map(ToString::to_string))
            });
        Ok(SendResult::delivered(external_id))
    }

    fn supports(&self, provider: ProviderKind) -> bool {
        provider == ProviderKind::Webhook
    }
}
