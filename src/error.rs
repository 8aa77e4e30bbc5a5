//! Error types for Libris server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::{book::BookStatus, borrow::BorrowStatus, user::UserStatus};

/// Numeric error codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NoSuchData = 4,
    BadValue = 5,
    Duplicate = 6,
    UserNotActive = 10,
    MaxBorrowsReached = 11,
    BookInactive = 12,
    BookNotAvailable = 13,
    AlreadyBorrowed = 14,
    RecordClosed = 15,
    NotRenewable = 16,
    OutOfStock = 17,
}

/// Precondition failures of ledger operations.
///
/// Each variant is a distinct, caller-visible reason why a borrow, return,
/// renewal or loss declaration was refused. No state is changed when one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerViolation {
    #[error("User account is {status}")]
    UserNotActive { status: UserStatus },

    #[error("Borrow limit reached ({current}/{max})")]
    BorrowLimitReached { current: i32, max: i32 },

    #[error("Book is no longer in the catalog")]
    BookInactive,

    #[error("Book is not available (status {status}, {available_stock} copies on shelf)")]
    BookUnavailable {
        status: BookStatus,
        available_stock: i32,
    },

    #[error("User already holds an unreturned copy of this book")]
    AlreadyBorrowed,

    #[error("Borrow record is already closed ({status})")]
    RecordClosed { status: BorrowStatus },

    #[error("Borrow record cannot be renewed (status {status}, renewed {renew_count}/{max_renew_count})")]
    NotRenewable {
        status: BorrowStatus,
        renew_count: i32,
        max_renew_count: i32,
    },

    #[error("No copy left on the shelf")]
    OutOfStock,
}

impl LedgerViolation {
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerViolation::UserNotActive { .. } => ErrorCode::UserNotActive,
            LedgerViolation::BorrowLimitReached { .. } => ErrorCode::MaxBorrowsReached,
            LedgerViolation::BookInactive => ErrorCode::BookInactive,
            LedgerViolation::BookUnavailable { .. } => ErrorCode::BookNotAvailable,
            LedgerViolation::AlreadyBorrowed => ErrorCode::AlreadyBorrowed,
            LedgerViolation::RecordClosed { .. } => ErrorCode::RecordClosed,
            LedgerViolation::NotRenewable { .. } => ErrorCode::NotRenewable,
            LedgerViolation::OutOfStock => ErrorCode::OutOfStock,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Invalid state: {0}")]
    InvalidState(#[from] LedgerViolation),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl AppError {
    pub fn user_not_found(id: i32) -> Self {
        AppError::NotFound(format!("User with id {} not found", id))
    }

    pub fn book_not_found(id: i32) -> Self {
        AppError::NotFound(format!("Book with id {} not found", id))
    }

    pub fn record_not_found(id: i32) -> Self {
        AppError::NotFound(format!("Borrow record with id {} not found", id))
    }

    pub fn category_not_found(id: i32) -> Self {
        AppError::NotFound(format!("Category with id {} not found", id))
    }

    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchData),
            AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue)
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Duplicate),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
            AppError::InvalidState(violation) => (StatusCode::CONFLICT, violation.code()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::InvalidState(violation) => violation.to_string(),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_violations_surface_as_conflicts() {
        let err = AppError::from(LedgerViolation::BorrowLimitReached { current: 5, max: 5 });
        let (status, code) = err.status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, ErrorCode::MaxBorrowsReached);
        assert_eq!(err.to_string(), "Invalid state: Borrow limit reached (5/5)");
    }

    #[test]
    fn not_found_and_validation_keep_their_status() {
        assert_eq!(
            AppError::book_not_found(3).status_and_code().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation("due_days".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn not_found_messages_name_the_entity() {
        assert_eq!(
            AppError::user_not_found(4).to_string(),
            "Not found: User with id 4 not found"
        );
        assert_eq!(
            AppError::record_not_found(9).to_string(),
            "Not found: Borrow record with id 9 not found"
        );
        assert_eq!(
            AppError::category_not_found(2).to_string(),
            "Not found: Category with id 2 not found"
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let response = AppError::Internal("redis exploded".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn violation_messages_name_the_state() {
        let violation = LedgerViolation::RecordClosed {
            status: BorrowStatus::Returned,
        };
        assert_eq!(violation.to_string(), "Borrow record is already closed (returned)");
        assert_eq!(violation.code(), ErrorCode::RecordClosed);
    }
}
