//! API error types and HTTP response conversion
//!
//! Every [`ConductorError`] converts into an [`ApiError`] with the status
//! callers rely on: rejected input is 400, unknown ids are 404, a full
//! worker or an empty fleet is 503, conflicts are 409 and store failures
//! are 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ConductorError;

/// API error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Always false
    pub success: bool,
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for programmatic handling
    pub code: String,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Custom API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Well-formed request with invalid values
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Conflict with existing state (port taken, illegal transition)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Capacity exhausted or no worker available
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Store unreachable or failing
    #[error("Store error: {0}")]
    StoreError(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    InternalError(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::ValidationError(_) | ApiError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StoreError(_) | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code identifier
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::StoreError(_) => "STORE_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::JsonError(_) => "JSON_ERROR",
        }
    }

    /// Get the error type name
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Unavailable(_) => "Unavailable",
            ApiError::StoreError(_) => "StoreError",
            ApiError::InternalError(_) => "InternalError",
            ApiError::JsonError(_) => "JsonError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiErrorResponse::new(self.error_type(), self.to_string(), self.code());

        if status.is_server_error() {
            tracing::error!("API Error: {:?}", body);
        } else {
            tracing::debug!("API Error: {:?}", body);
        }

        (status, Json(body)).into_response()
    }
}

impl From<ConductorError> for ApiError {
    fn from(err: ConductorError) -> Self {
        let message = err.to_string();
        match err {
            ConductorError::Validation(_) | ConductorError::Config(_) => ApiError::ValidationError(message),
            ConductorError::JobNotFound(_)
            | ConductorError::WorkerNotFound(_)
            | ConductorError::ExecutionNotFound(_) => ApiError::NotFound(message),
            ConductorError::Capacity { .. } | ConductorError::NoWorkers(_) => ApiError::Unavailable(message),
            ConductorError::PortConflict(_) | ConductorError::InvalidStateTransition { .. } => {
                ApiError::Conflict(message)
            }
            ConductorError::Store(_) => ApiError::StoreError(message),
            ConductorError::Serialization(_) => ApiError::JsonError(message),
            ConductorError::Deployment(_) | ConductorError::Node { .. } | ConductorError::General(_) => {
                ApiError::InternalError(message)
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::JsonError(err.to_string())
    }
}
