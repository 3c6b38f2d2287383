//! HTTP adapter for the lending ledger
//!
//! Maps requests onto engine and query calls and renders each outcome; the
//! engine itself knows nothing about HTTP.

pub mod books;
pub mod health;
pub mod inventory;
pub mod loans;
pub mod members;
pub mod openapi;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::ToSchema;
use validator::Validate;

use crate::{error::AppError, error::AppResult, AppState};

/// Plain status message
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Run `validator` checks on a request body
pub(crate) fn validated<T: Validate>(request: T) -> AppResult<T> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;
    Ok(request)
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Members
        .route("/members", post(members::create_member))
        .route(
            "/members/:id",
            get(members::get_member).delete(members::delete_member),
        )
        // Books
        .route("/books", post(books::create_book))
        .route("/books/:id", get(books::get_book).delete(books::delete_book))
        // Loans
        .route("/loans", post(loans::issue_book))
        .route("/loans/return", post(loans::return_book))
        // Inventory
        .route("/inventory", get(inventory::list_inventory))
        .route("/inventory/reconcile", get(inventory::reconcile))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
