use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::tenant::Role;

pub const ANONYMOUS_SENDER: &str = "Anonymous";

/// Staff chat line. Kept in memory only and shared across every tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Millisecond timestamp of receipt.
    pub id: i64,
    pub sender: String,
    #[serde(default)]
    pub role: Option<Role>,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ChatMessage {
    pub fn new(sender: Option<String>, role: Option<Role>, text: String, at: OffsetDateTime) -> Self {
        let sender = sender
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| ANONYMOUS_SENDER.to_string());
        Self {
            id: (at.unix_timestamp_nanos() / 1_000_000) as i64,
            sender,
            role,
            text,
            timestamp: at,
        }
    }
}
