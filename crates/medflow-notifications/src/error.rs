use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Recipient not found")]
    RecipientNotFound,
}
