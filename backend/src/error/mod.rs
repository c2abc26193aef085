//! Error handling for AgriVault
//!
//! Three layers of errors live here:
//!
//! - [`LendingError`] is what the lending engine (valuation, interest, collateral
//!   locking, the loan ledger) returns. Every variant is recoverable by the caller.
//! - [`StoreError`] is what a persistence backend reports.
//! - [`ApiError`] is the HTTP boundary, with status code mapping and JSON bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the lending engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LendingError {
    /// Bad input shape or range (non-positive amount, tenure <= 0, ratio out of range)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Collateral not owned by the caller or not in a lockable state
    #[error("Ineligible collateral: {0}")]
    IneligibleCollateral(String),

    /// A concurrent lock, repayment or status change won the race
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not the owner of the entity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LendingError {
    /// Prefix the message with the entity it concerns, e.g. `loan LN2410AB12CD`.
    pub fn context(self, entity: impl std::fmt::Display) -> Self {
        match self {
            LendingError::Validation(m) => LendingError::Validation(format!("{}: {}", entity, m)),
            LendingError::IneligibleCollateral(m) => {
                LendingError::IneligibleCollateral(format!("{}: {}", entity, m))
            }
            LendingError::Conflict(m) => LendingError::Conflict(format!("{}: {}", entity, m)),
            LendingError::NotFound(m) => LendingError::NotFound(format!("{}: {}", entity, m)),
            LendingError::Unauthorized(m) => {
                LendingError::Unauthorized(format!("{}: {}", entity, m))
            }
            LendingError::Storage(m) => LendingError::Storage(format!("{}: {}", entity, m)),
        }
    }
}

/// Result type alias using LendingError
pub type LendingResult<T> = Result<T, LendingError>;

/// Errors reported by a persistence backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LendingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(key) => {
                LendingError::Conflict(format!("duplicate key: {}", key))
            }
            StoreError::Backend(msg) => LendingError::Storage(msg),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::DuplicateKey(
                    db_err
                        .constraint()
                        .map(str::to_string)
                        .unwrap_or_else(|| db_err.message().to_string()),
                )
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::UnprocessableEntity(_) => "INELIGIBLE_COLLATERAL",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        match err {
            LendingError::Validation(m) => ApiError::ValidationError(m),
            LendingError::IneligibleCollateral(m) => ApiError::UnprocessableEntity(m),
            LendingError::Conflict(m) => ApiError::Conflict(m),
            LendingError::NotFound(m) => ApiError::NotFound(m),
            LendingError::Unauthorized(m) => ApiError::Forbidden(m),
            LendingError::Storage(m) => ApiError::DatabaseError(m),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        LendingError::from(err).into()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
