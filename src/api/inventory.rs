//! Inventory listing and reconciliation endpoints

use std::fmt::Write as _;

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{InventorySnapshot, ReconciliationReport},
};

#[derive(Serialize, ToSchema)]
pub struct InventoryResponse {
    pub snapshot: InventorySnapshot,
    /// Plain-text listing of the snapshot
    pub rendered: String,
}

/// Render a snapshot as a plain-text listing
pub fn render_snapshot(snapshot: &InventorySnapshot) -> String {
    let mut out = String::from("MEMBERS:\n");
    for m in &snapshot.members {
        let _ = writeln!(
            out,
            "{}: {} - Borrowed: [{}]",
            m.member_id,
            m.name,
            m.held_books.join(", ")
        );
    }

    out.push_str("\nBOOKS:\n");
    for b in &snapshot.books {
        let _ = writeln!(
            out,
            "{}: {} by {} - Available: {}/{}",
            b.book_id, b.title, b.author, b.available, b.total_quantity
        );
    }
    out
}

/// List every member and book
#[utoipa::path(
    get,
    path = "/inventory",
    tag = "inventory",
    responses(
        (status = 200, description = "Inventory snapshot", body = InventoryResponse),
        (status = 503, description = "Store unreachable")
    )
)]
pub async fn list_inventory(
    State(state): State<crate::AppState>,
) -> AppResult<Json<InventoryResponse>> {
    let snapshot = state.services.query.list_all().await?;
    let rendered = render_snapshot(&snapshot);
    Ok(Json(InventoryResponse { snapshot, rendered }))
}

/// Cross-check member holds against book availability
#[utoipa::path(
    get,
    path = "/inventory/reconcile",
    tag = "inventory",
    responses(
        (status = 200, description = "Reconciliation report", body = ReconciliationReport),
        (status = 503, description = "Store unreachable")
    )
)]
pub async fn reconcile(
    State(state): State<crate::AppState>,
) -> AppResult<Json<ReconciliationReport>> {
    let report = state.services.query.reconcile().await?;
    Ok(Json(report))
}
