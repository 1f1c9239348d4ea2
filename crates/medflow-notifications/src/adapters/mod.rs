pub mod log;
pub mod twilio;
pub mod webhook;

use async_trait::async_trait;

use crate::error::NotificationError;
use crate::provider::{ProviderConfig, ProviderKind};
use crate::types::Notification;

/// Result of sending a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    pub external_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(external_id: Option<String>) -> Self {
        Self {
            success: true,
            external_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

/// Adapter for one outbound transport
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    /// Send a notification
    async fn send(
        &self,
        config: &ProviderConfig,
        notification: &Notification,
    ) -> Result<SendResult, NotificationError>;

    /// Check if adapter can handle this provider
    fn supports(&self, provider: ProviderKind) -> bool;
}

pub use log::LogAdapter;
pub use twilio::TwilioAdapter;
pub use webhook::WebhookAdapter;
