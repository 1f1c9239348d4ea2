use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Delivery channel for a patient message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Sms,
    Whatsapp,
}

impl NotificationChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
        }
    }
}

/// A rendered message addressed to one phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub channel: NotificationChannel,

    /// E.164 phone number of the recipient
    pub destination: String,

    pub body: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    pub fn new(
        destination: impl Into<String>,
        body: impl Into<String>,
        channel: NotificationChannel,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            destination: destination.into(),
            body: body.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
