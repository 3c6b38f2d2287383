//! Loan endpoints: issue and return

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{loan::LoanReceipt, BookId, MemberId},
};

use super::validated;

/// Loan request (used for both issue and return)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoanRequest {
    /// Member ID
    #[validate(length(min = 1, max = 64))]
    pub member_id: String,
    /// Book ID
    #[validate(length(min = 1, max = 64))]
    pub book_id: String,
}

/// Loan response with the updated availability
#[derive(Serialize, ToSchema)]
pub struct LoanResponse {
    pub receipt: LoanReceipt,
    /// Status message
    pub message: String,
}

/// Issue a book to a member
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = LoanRequest,
    responses(
        (status = 201, description = "Book issued", body = LoanResponse),
        (status = 404, description = "Member or book not found"),
        (status = 409, description = "Concurrent updates, retry"),
        (status = 422, description = "No copies available or already held")
    )
)]
pub async fn issue_book(
    State(state): State<crate::AppState>,
    Json(request): Json<LoanRequest>,
) -> AppResult<(StatusCode, Json<LoanResponse>)> {
    let request = validated(request)?;
    let member_id = MemberId::parse(&request.member_id)?;
    let book_id = BookId::parse(&request.book_id)?;

    let inventory = &state.services.inventory;
    let receipt = inventory
        .issue(&member_id, &book_id, inventory.default_deadline())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LoanResponse {
            message: format!("Book '{}' issued to {}.", receipt.title, receipt.member_name),
            receipt,
        }),
    ))
}

/// Return a book held by a member
#[utoipa::path(
    post,
    path = "/loans/return",
    tag = "loans",
    request_body = LoanRequest,
    responses(
        (status = 200, description = "Book returned", body = LoanResponse),
        (status = 404, description = "Member or book not found"),
        (status = 422, description = "Book not issued to this member")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    Json(request): Json<LoanRequest>,
) -> AppResult<Json<LoanResponse>> {
    let request = validated(request)?;
    let member_id = MemberId::parse(&request.member_id)?;
    let book_id = BookId::parse(&request.book_id)?;

    let inventory = &state.services.inventory;
    let receipt = inventory
        .return_book(&member_id, &book_id, inventory.default_deadline())
        .await?;

    Ok(Json(LoanResponse {
        message: format!("Book '{}' returned by {}.", receipt.title, receipt.member_name),
        receipt,
    }))
}
