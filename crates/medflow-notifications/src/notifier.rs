use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::{LogAdapter, NotificationAdapter, SendResult, TwilioAdapter, WebhookAdapter};
use crate::provider::{ProviderConfig, ProviderKind};
use crate::types::{Notification, NotificationChannel};

/// Fire-and-forget delivery of a rendered message.
///
/// Implementations never fail past this boundary: transport errors are
/// logged and folded into the returned [`SendResult`].
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, destination: &str, message: &str, channel: NotificationChannel)
        -> SendResult;
}

/// Routes messages to the configured provider, falling back to the log
/// adapter when credentials are incomplete.
pub struct Notifier {
    config: ProviderConfig,
    adapters: Vec<Arc<dyn NotificationAdapter>>,
    fallback: LogAdapter,
}

impl Notifier {
    pub fn new(config: ProviderConfig) -> Self {
        if !config.is_complete() {
            tracing::warn!(
                provider = ?config.provider,
                "notification provider credentials incomplete; messages will be logged only"
            );
        }
        Self {
            config,
            adapters: vec![
                Arc::new(TwilioAdapter::new()),
                Arc::new(WebhookAdapter::new()),
                Arc::new(LogAdapter),
            ],
            fallback: LogAdapter,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn NotificationAdapter>) -> Self {
        self.adapters.insert(0, adapter);
        self
    }

    pub fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    fn adapter(&self) -> Option<&Arc<dyn NotificationAdapter>> {
        if !self.config.is_complete() {
            return None;
        }
        self.adapters
            .iter()
            .find(|a| a.supports(self.config.provider))
    }
}

#[async_trait]
impl NotificationSender for Notifier {
    async fn send(
        &self,
        destination: &str,
        message: &str,
        channel: NotificationChannel,
    ) -> SendResult {
        let notification = Notification::new(destination, message, channel);
        tracing::info!(
            notification_id = %notification.id,
            channel = channel.as_str(),
            to = %destination,
            "sending notification"
        );

        let outcome = match self.adapter() {
            Some(adapter) => adapter.send(&self.config, &notification).await,
            None => self.fallback.send(&self.config, &notification).await,
        };

        match outcome {
            Ok(result) => {
                if let Some(error) = &result.error {
                    tracing::warn!(notification_id = %notification.id, error = %error, "notification not delivered");
                }
                result
            }
            Err(e) => {
                tracing::warn!(notification_id = %notification.id, error = %e, "notification send failed");
                SendResult::failed(e.to_string())
            }
        }
    }
}
