//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, inventory, loans, members, MessageResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lending Ledger API",
        version = "0.1.0",
        description = "Lending library inventory REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Members
        members::create_member,
        members::get_member,
        members::delete_member,
        // Books
        books::create_book,
        books::get_book,
        books::delete_book,
        // Loans
        loans::issue_book,
        loans::return_book,
        // Inventory
        inventory::list_inventory,
        inventory::reconcile,
    ),
    components(
        schemas(
            // Members
            members::CreateMemberRequest,
            members::MemberResponse,
            crate::models::member::MemberView,
            // Books
            books::CreateBookRequest,
            books::BookResponse,
            crate::models::book::BookView,
            // Loans
            loans::LoanRequest,
            loans::LoanResponse,
            crate::models::loan::LoanReceipt,
            // Inventory
            inventory::InventoryResponse,
            crate::models::snapshot::InventorySnapshot,
            crate::models::snapshot::ReconciliationReport,
            crate::models::snapshot::Discrepancy,
            // Health
            health::HealthResponse,
            // Common
            MessageResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "members", description = "Member registration and retirement"),
        (name = "books", description = "Book registration and retirement"),
        (name = "loans", description = "Issue and return"),
        (name = "inventory", description = "Read-only inventory views")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
