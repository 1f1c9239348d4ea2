use async_trait::async_trait;
use reqwest::Client;

use super::{NotificationAdapter, SendResult};
use crate::error::NotificationError;
use crate::provider::{ProviderConfig, ProviderKind};
use crate::types::{Notification, NotificationChannel};

const TWILIO_API_BASE: &str = "https://api.twilio.com";

pub struct TwilioAdapter {
    http_client: Client,
}

impl TwilioAdapter {
    pub fn new() -> Self {
        Self {
            http_client: Client::new(),
        }
    }

    fn form_body(fields: &[(&str, &str)]) -> String {
        fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// WhatsApp addresses carry a `whatsapp:` scheme on both ends.
    fn addresses(
        config: &ProviderConfig,
        notification: &Notification,
    ) -> Result<(String, String), NotificationError> {
        let sms_from = config.twilio_phone_number.as_ref().ok_or_else(|| {
            NotificationError::InvalidConfig("Missing twilio_phone_number".into())
        })?;
        if notification.destination.trim().is_empty() {
            return Err(NotificationError::RecipientNotFound);
        }

        Ok(match notification.channel {
            NotificationChannel::Sms => (sms_from.clone(), notification.destination.clone()),
            NotificationChannel::Whatsapp => {
                let from = config.twilio_whatsapp_number.as_ref().unwrap_or(sms_from);
                (
                    format!("whatsapp:{}", from),
                    format!("whatsapp:{}", notification.destination),
                )
            }
        })
    }
}

impl Default for TwilioAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationAdapter for TwilioAdapter {
    async fn send(
        &self,
        config: &ProviderConfig,
        notification: &Notification,
    ) -> Result<SendResult, NotificationError> {
        let account_sid = config
            .twilio_account_sid
            .as_ref()
            .ok_or(NotificationError::InvalidConfig(
                "Missing twilio_account_sid".into(),
            ))?;
        let auth_token = config
            .twilio_auth_token
            .as_ref()
            .ok_or(NotificationError::InvalidConfig(
                "Missing twilio_auth_token".into(),
            ))?;

        let (from, to) = Self::addresses(config, notification)?;
        let base = config
            .twilio_api_base
            .as_deref()
            .unwrap_or(TWILIO_API_BASE)
            .trim_end_matches('/');
        let url = format!("{}/2010-04-01/Accounts/{}/Messages.json", base, account_sid);

        let body = Self::form_body(&[
            ("To", to.as_str()),
            ("From", from.as_str()),
            ("Body", notification.body.as_str()),
        ]);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(account_sid, Some(auth_token))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        let status = response.status();
        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;

        if status.is_success() {
            let sid = response_body["sid"].as_str().map(str::to_string);
            Ok(SendResult::delivered(sid))
        } else {
            let message = response_body["message"]
                .as_str()
                .unwrap_or("Unknown error")
                .to_string();
            Ok(SendResult::failed(format!(
                "Twilio error ({}): {}",
                status.as_u16(),
                message
            )))
        }
    }

    fn supports(&self, provider: ProviderKind) -> bool {
        provider == ProviderKind::Twilio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            provider: ProviderKind::Twilio,
            twilio_account_sid: Some("AC1".into()),
            twilio_auth_token: Some("tok".into()),
            twilio_phone_number: Some("+15550001111".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_form_body_is_url_encoded() {
        let body = TwilioAdapter::form_body(&[("To", "+91 98"), ("Body", "a&b=c")]);
        assert_eq!(body, "To=%2B91%2098&Body=a%26b%3Dc");
    }

    #[test]
    fn test_whatsapp_addresses_fall_back_to_sms_sender() {
        let n = Notification::new("+919800000000", "hi", NotificationChannel::Whatsapp);
        let (from, to) = TwilioAdapter::addresses(&config(), &n).unwrap();
        assert_eq!(from, "whatsapp:+15550001111");
        assert_eq!(to, "whatsapp:+919800000000");
    }

    #[test]
    fn test_sms_addresses_are_plain() {
        let n = Notification::new("+919800000000", "hi", NotificationChannel::Sms);
        let (from, to) = TwilioAdapter::addresses(&config(), &n).unwrap();
        assert_eq!(from, "+15550001111");
        assert_eq!(to, "+919800000000");
    }

    #[test]
    fn test_blank_destination_rejected() {
        let n = Notification::new(" ", "hi", NotificationChannel::Sms);
        assert!(matches!(
            TwilioAdapter::addresses(&config(), &n),
            Err(NotificationError::RecipientNotFound)
        ));
    }
}
