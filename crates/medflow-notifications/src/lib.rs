//! Outbound patient messaging (SMS and WhatsApp).

pub mod adapters;
pub mod error;
pub mod notifier;
pub mod provider;
pub mod templates;
pub mod types;

pub use adapters::{LogAdapter, NotificationAdapter, SendResult, TwilioAdapter, WebhookAdapter};
pub use error::NotificationError;
pub use notifier::{NotificationSender, Notifier};
pub use provider::{ProviderConfig, ProviderKind, mask_secrets};
pub use templates::{Template, TemplateRenderer};
pub use types::*;
