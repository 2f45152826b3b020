/// Error taxonomy for the inventory server, with the HTTP mapping
/// each variant carries to the dashboard API
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QmError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller is known but lacks the right role
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown account category
    #[error("Unknown category: {0}")]
    CategoryNotFound(String),

    /// Claim refused because the requester claimed too recently
    #[error("Cooldown active: {remaining_secs}s remaining")]
    CooldownActive { remaining_secs: i64 },

    /// Claim refused because the category has no available accounts
    #[error("No accounts available in category: {0}")]
    StockExhausted(String),

    /// Bulk import rejected; carries the offending line number
    #[error("Batch rejected at line {line}: {reason}")]
    BatchValidation { line: usize, reason: String },

    /// Carries how long the client should back off
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate category)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credential delivery to the requester failed
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JWT error: {0}")]
    Jwt(String),
}

/// JSON body attached to every non-2xx response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for QmError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            QmError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            QmError::PermissionDenied(_) => (
                StatusCode::FORBIDDEN,
                "PermissionDenied",
                self.to_string(),
            ),
            QmError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            QmError::CategoryNotFound(_) => (
                StatusCode::NOT_FOUND,
                "CategoryNotFound",
                self.to_string(),
            ),
            QmError::CooldownActive { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "CooldownActive",
                self.to_string(),
            ),
            QmError::StockExhausted(_) => (
                StatusCode::CONFLICT,
                "StockExhausted",
                self.to_string(),
            ),
            QmError::BatchValidation { .. } => (
                StatusCode::BAD_REQUEST,
                "BatchValidation",
                self.to_string(),
            ),
            QmError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            QmError::Conflict(_) => (
                StatusCode::CONFLICT,
                "Conflict",
                self.to_string(),
            ),
            QmError::DeliveryFailed(_) => (
                StatusCode::BAD_GATEWAY,
                "DeliveryFailed",
                self.to_string(),
            ),
            QmError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            QmError::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                "Invalid or expired token".to_string(),
            ),
            QmError::Database(_) | QmError::Internal(_) | QmError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                // 500s get a generic body, the detail stays in the logs
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ApiErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

pub type QmResult<T> = Result<T, QmError>;
