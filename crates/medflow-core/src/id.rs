use rand::RngCore;

use crate::error::{CoreError, Result};

const MAX_ID_LEN: usize = 64;

/// Generate a record id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a long-lived public sharing token (256 bits, hex-encoded).
pub fn generate_public_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate an id taken from a path segment or client payload.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(CoreError::invalid_id(id));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::invalid_id(id));
    }
    Ok(())
}
