//! Error types for the lending ledger
//!
//! Every public engine operation returns one of the outcomes below; nothing
//! escapes as a panic. [`ErrorKind`] groups them by who can act on them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::{BookId, MemberId};
use crate::repository::StoreError;

/// Numeric outcome codes reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    StoreFailure = 2,
    NoSuchMember = 3,
    NoSuchBook = 4,
    Duplicate = 5,
    BadValue = 6,
    NoCopiesAvailable = 7,
    AlreadyHeld = 8,
    NotIssuedToMember = 9,
    HasOutstandingLoans = 10,
    VersionConflict = 11,
    Timeout = 12,
    PartialFailure = 13,
}

/// Outcome taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Member or book absent; user-correctable.
    NotFound,
    /// Duplicate id; user-correctable.
    AlreadyExists,
    /// Malformed quantity or id; user-correctable.
    InvalidInput,
    /// Business rule violated by the current ledger state; user-correctable.
    StateConflict,
    /// Version conflicts outlasted the retry budget; retry later.
    Concurrency,
    /// Store unreachable or too slow.
    Infrastructure,
    /// Ledger left inconsistent; needs manual reconciliation.
    PartialFailure,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Member {0} not found")]
    MemberNotFound(MemberId),

    #[error("Book {0} not found")]
    BookNotFound(BookId),

    #[error("Member with ID {0} already exists")]
    MemberAlreadyExists(MemberId),

    #[error("Book with ID {0} already exists")]
    BookAlreadyExists(BookId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid quantity {0}: must be between 0 and {max}", max = u32::MAX)]
    InvalidQuantity(i64),

    #[error("No available copies of book {0}")]
    NoCopiesAvailable(BookId),

    #[error("Member {member_id} already holds a copy of book {book_id}")]
    AlreadyHeld { member_id: MemberId, book_id: BookId },

    #[error("Book {book_id} is not issued to member {member_id}")]
    NotIssuedToMember { member_id: MemberId, book_id: BookId },

    #[error("Member {member_id} still holds books: {}", format_ids(.book_ids))]
    MemberHasOutstandingLoans {
        member_id: MemberId,
        book_ids: Vec<BookId>,
    },

    #[error("Book {book_id} still has {outstanding} copies issued")]
    BookHasOutstandingLoans { book_id: BookId, outstanding: u32 },

    #[error("Conflicting concurrent updates after {attempts} attempts, retry")]
    Conflict { attempts: u32 },

    #[error("Operation timed out; its effect on the ledger is unknown")]
    Timeout,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Error fetching data: {0}")]
    ReadError(String),

    #[error("Partial failure, manual reconciliation required: {0}")]
    PartialFailure(String),

    #[error("Ledger inconsistency detected: {0}")]
    Inconsistent(String),
}

fn format_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MemberNotFound(_) | AppError::BookNotFound(_) => ErrorKind::NotFound,
            AppError::MemberAlreadyExists(_) | AppError::BookAlreadyExists(_) => {
                ErrorKind::AlreadyExists
            }
            AppError::InvalidInput(_) | AppError::InvalidQuantity(_) => ErrorKind::InvalidInput,
            AppError::NoCopiesAvailable(_)
            | AppError::AlreadyHeld { .. }
            | AppError::NotIssuedToMember { .. }
            | AppError::MemberHasOutstandingLoans { .. }
            | AppError::BookHasOutstandingLoans { .. } => ErrorKind::StateConflict,
            AppError::Conflict { .. } => ErrorKind::Concurrency,
            AppError::Timeout | AppError::Store(_) | AppError::ReadError(_) => {
                ErrorKind::Infrastructure
            }
            AppError::PartialFailure(_) | AppError::Inconsistent(_) => ErrorKind::PartialFailure,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::MemberNotFound(_) => ErrorCode::NoSuchMember,
            AppError::BookNotFound(_) => ErrorCode::NoSuchBook,
            AppError::MemberAlreadyExists(_) | AppError::BookAlreadyExists(_) => {
                ErrorCode::Duplicate
            }
            AppError::InvalidInput(_) | AppError::InvalidQuantity(_) => ErrorCode::BadValue,
            AppError::NoCopiesAvailable(_) => ErrorCode::NoCopiesAvailable,
            AppError::AlreadyHeld { .. } => ErrorCode::AlreadyHeld,
            AppError::NotIssuedToMember { .. } => ErrorCode::NotIssuedToMember,
            AppError::MemberHasOutstandingLoans { .. }
            | AppError::BookHasOutstandingLoans { .. } => ErrorCode::HasOutstandingLoans,
            AppError::Conflict { .. } => ErrorCode::VersionConflict,
            AppError::Timeout => ErrorCode::Timeout,
            AppError::Store(_) | AppError::ReadError(_) => ErrorCode::StoreFailure,
            AppError::PartialFailure(_) => ErrorCode::PartialFailure,
            AppError::Inconsistent(_) => ErrorCode::Failure,
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::StateConflict => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Concurrency => StatusCode::CONFLICT,
            ErrorKind::Infrastructure => match self {
                AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            },
            ErrorKind::PartialFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    #[schema(value_type = String)]
    pub kind: ErrorKind,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.kind() {
            ErrorKind::Infrastructure => tracing::error!("Store error: {}", self),
            ErrorKind::PartialFailure => tracing::error!("Ledger needs reconciliation: {}", self),
            _ => {}
        }

        let code = self.code();
        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            kind: self.kind(),
            message: self.to_string(),
        });

        (self.status(), body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
