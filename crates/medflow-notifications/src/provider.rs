use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which outbound transport delivers patient messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Log only; nothing leaves the process.
    #[default]
    Log,
    Twilio,
    Webhook,
}

/// Provider configuration. Missing credentials degrade to log-only delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    // Twilio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_account_sid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_auth_token: Option<String>,

    /// Sender number for SMS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_phone_number: Option<String>,

    /// Sender number for WhatsApp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_whatsapp_number: Option<String>,

    /// Override for the Twilio REST base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_api_base: Option<String>,

    // Webhook (SMS gateway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_headers: Option<HashMap<String, String>>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl ProviderConfig {
    /// Returns `true` if the selected provider has every credential it needs.
    pub fn is_complete(&self) -> bool {
        match self.provider {
            ProviderKind::Log => true,
            ProviderKind::Twilio => {
                present(&self.twilio_account_sid)
                    && present(&self.twilio_auth_token)
                    && present(&self.twilio_phone_number)
            }
            ProviderKind::Webhook => present(&self.webhook_url),
        }
    }
}

/// Mask secrets before logging the configuration.
pub fn mask_secrets(mut config: ProviderConfig) -> ProviderConfig {
    if config.twilio_auth_token.is_some() {
        config.twilio_auth_token = Some("***".to_string());
    }
    if config.webhook_secret.is_some() {
        config.webhook_secret = Some("***".to_string());
    }
    config
}
