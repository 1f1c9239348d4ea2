use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use medflow_core::CoreError;
use medflow_storage::{ErrorCategory, StorageError};
use serde_json::json;
use thiserror::Error;

use crate::realtime::IntentError;

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found_for_tenant() -> Self {
        Self::NotFound("Record not found for this tenant".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e.category() {
            ErrorCategory::NotFound => Self::not_found_for_tenant(),
            ErrorCategory::Validation => Self::BadRequest(e.to_string()),
            ErrorCategory::Infrastructure | ErrorCategory::Internal => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e.category() {
            medflow_core::ErrorCategory::Conflict => Self::Conflict(e.to_string()),
            _ => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<IntentError> for ApiError {
    fn from(e: IntentError) -> Self {
        match e {
            IntentError::Unauthorized => Self::Unauthorized,
            IntentError::Forbidden => Self::Forbidden,
            IntentError::NotFound => Self::not_found_for_tenant(),
            IntentError::Validation(message) => Self::BadRequest(message),
            IntentError::Storage(e) => e.into(),
        }
    }
}
