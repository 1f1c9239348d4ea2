use thiserror::Error;

/// Core error types for MedFlow domain operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid tenant id: {0}")]
    InvalidTenant(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Invalid status value: {0}")]
    InvalidStatus(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid UTC offset: {0}")]
    InvalidOffset(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time parsing error: {0}")]
    TimeError(#[from] time::error::Parse),
}

impl CoreError {
    pub fn invalid_tenant(tenant: impl Into<String>) -> Self {
        Self::InvalidTenant(tenant.into())
    }

    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    pub fn invalid_status(status: impl Into<String>) -> Self {
        Self::InvalidStatus(status.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_date(date: impl Into<String>) -> Self {
        Self::InvalidDate(date.into())
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidTenant(_)
            | Self::InvalidId(_)
            | Self::InvalidStatus(_)
            | Self::InvalidDate(_) => ErrorCategory::Validation,
            Self::InvalidTransition { .. } => ErrorCategory::Conflict,
            Self::InvalidOffset(_) => ErrorCategory::Configuration,
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::TimeError(_) => ErrorCategory::Validation,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Conflict,
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Conflict => write!(f, "conflict"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
