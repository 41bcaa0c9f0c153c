//! Error handling for the IEEP ERP platform
//!
//! Every failure becomes an [`AppError`] and is rendered as a JSON error body
//! with a stable machine-readable code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{AllocationError, LedgerError};
use thiserror::Error;

/// PostgreSQL SQLSTATE codes the service reacts to
mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const LOCK_NOT_AVAILABLE: &str = "55P03";
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient stock of {product} in {warehouse}: {available} available, {requested} requested")]
    InsufficientStock {
        product: String,
        warehouse: String,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Concurrent update conflict, retry the request")]
    ConcurrencyConflict,

    // External service errors
    #[error("Notification delivery failed: {0}")]
    NotificationFailed(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(resource.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(sqlstate::UNIQUE_VIOLATION) => {
                    let constraint = db_err.constraint().unwrap_or("unique key").to_string();
                    return AppError::DuplicateEntry(constraint);
                }
                Some(sqlstate::FOREIGN_KEY_VIOLATION) | Some(sqlstate::CHECK_VIOLATION) => {
                    let constraint = db_err.constraint().unwrap_or("constraint").to_string();
                    return AppError::IntegrityViolation(constraint);
                }
                Some(sqlstate::SERIALIZATION_FAILURE)
                | Some(sqlstate::DEADLOCK_DETECTED)
                | Some(sqlstate::LOCK_NOT_AVAILABLE) => return AppError::ConcurrencyConflict,
                _ => {}
            }
        }
        AppError::DatabaseError(err)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientStock {
                available,
                requested,
            } => AppError::InsufficientStock {
                product: "stock item".to_string(),
                warehouse: "warehouse".to_string(),
                available,
                requested,
            },
            other => AppError::validation("quantity", other.to_string()),
        }
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Insufficient {
                product_id,
                requested,
                largest_available,
            } => AppError::InsufficientStock {
                product: product_id.to_string(),
                warehouse: "warehouse".to_string(),
                available: largest_available,
                requested,
            },
            AllocationError::NonPositiveQuantity { .. } => {
                AppError::validation("quantity", err.to_string())
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
        }
    }

    fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_CREDENTIALS", "Invalid username or password"),
            ),
            AppError::AccountDisabled => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("ACCOUNT_DISABLED", "Account is disabled"),
            ),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("INVALID_TOKEN", "Invalid token"),
            ),
            AppError::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                ErrorDetail::new(
                    "INSUFFICIENT_PERMISSIONS",
                    "You do not have permission to perform this action",
                ),
            ),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone()),
            ),
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(field),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "DUPLICATE_ENTRY",
                    format!("A record with this {} already exists", field),
                )
                .with_field(field),
            ),
            AppError::IntegrityViolation(constraint) => (
                StatusCode::CONFLICT,
                ErrorDetail::new(
                    "INTEGRITY_VIOLATION",
                    format!("Constraint {} was violated", constraint),
                ),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INVALID_STATE_TRANSITION", msg.clone()),
            ),
            AppError::InsufficientStock { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new("INSUFFICIENT_STOCK", self.to_string()),
            ),
            AppError::ConcurrencyConflict => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONCURRENCY_CONFLICT", self.to_string()),
            ),
            AppError::NotificationFailed(msg) => (
                StatusCode::BAD_GATEWAY,
                ErrorDetail::new("NOTIFICATION_FAILED", format!("Notification delivery failed: {}", msg)),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::warn!(code = %error_detail.code, "request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_ledger_errors_map_to_http_errors() {
        let err: AppError = LedgerError::InsufficientStock {
            available: dec!(3),
            requested: dec!(5),
        }
        .into();
        assert!(matches!(err, AppError::InsufficientStock { .. }));

        let err: AppError = LedgerError::NegativeAmount.into();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "quantity"));
    }

    #[test]
    fn test_allocation_error_names_product() {
        let product_id = Uuid::new_v4();
        let err: AppError = AllocationError::Insufficient {
            product_id,
            requested: dec!(5),
            largest_available: dec!(3),
        }
        .into();
        assert!(err.to_string().contains(&product_id.to_string()));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::ConcurrencyConflict.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::not_found("Stock item").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::validation("quantity", "bad").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert!(AppError::ConcurrencyConflict.is_retryable());
    }
}
