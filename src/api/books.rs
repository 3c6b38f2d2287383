//! Book management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{BookId, BookView},
};

use super::{validated, MessageResponse};

/// Register book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBookRequest {
    /// Caller-assigned book ID
    #[validate(length(min = 1, max = 64))]
    pub book_id: String,
    #[validate(length(max = 512))]
    pub title: String,
    #[validate(length(max = 256))]
    pub author: String,
    /// Number of copies; must not be negative
    pub quantity: i64,
}

#[derive(Serialize, ToSchema)]
pub struct BookResponse {
    pub book: BookView,
    pub message: String,
}

/// Register a new book title
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Book registered", body = BookResponse),
        (status = 400, description = "Invalid input or quantity"),
        (status = 409, description = "Book ID already exists")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    Json(request): Json<CreateBookRequest>,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    let request = validated(request)?;
    let book_id = BookId::parse(&request.book_id)?;

    let inventory = &state.services.inventory;
    let book = inventory
        .register_book(
            &book_id,
            &request.title,
            &request.author,
            request.quantity,
            inventory.default_deadline(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            message: format!(
                "{} copies of '{}' added successfully.",
                book.total_quantity, book.title
            ),
            book: BookView::from(&book),
        }),
    ))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = String, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookView),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<BookView>> {
    let book_id = BookId::parse(&id)?;
    let book = state.services.query.get_book(&book_id).await?;
    Ok(Json(book))
}

/// Retire a book with every copy on the shelf
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    params(
        ("id" = String, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 404, description = "Book not found"),
        (status = 422, description = "Copies still issued")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let book_id = BookId::parse(&id)?;

    let inventory = &state.services.inventory;
    inventory
        .retire_book(&book_id, inventory.default_deadline())
        .await?;

    Ok(Json(MessageResponse {
        message: format!("Book {} deleted successfully.", book_id),
    }))
}
