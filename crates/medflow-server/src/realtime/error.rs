use medflow_storage::StorageError;
use thiserror::Error;

/// Why an intent was refused. Reported to the initiating connection only.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("{0}")]
    Validation(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    /// Missing and cross-tenant records are indistinguishable.
    #[error("Record not found for this tenant")]
    NotFound,

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl IntentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Failures the caller could not have avoided.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<StorageError> for IntentError {
    fn from(e: StorageError) -> Self {
        if e.is_not_found() {
            Self::NotFound
        } else {
            Self::Storage(e)
        }
    }
}
