use async_trait::async_trait;

use super::{NotificationAdapter, SendResult};
use crate::error::NotificationError;
use crate::provider::{ProviderConfig, ProviderKind};
use crate::types::Notification;

/// Writes the message to the log and reports success.
#[derive(Debug, Default)]
pub struct LogAdapter;

#[async_trait]
impl NotificationAdapter for LogAdapter {
    async fn send(
        &self,
        _config: &ProviderConfig,
        notification: &Notification,
    ) -> Result<SendResult, NotificationError> {
        tracing::info!(
            notification_id = %notification.id,
            channel = notification.channel.as_str(),
            to = %notification.destination,
            body = %notification.body,
            "notification logged (no provider)"
        );
        Ok(SendResult::delivered(None))
    }

    fn supports(&self, provider: ProviderKind) -> bool {
        provider == ProviderKind::Log
    }
}
