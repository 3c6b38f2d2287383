//! Query view: read-only projections of the ledger
//!
//! Members and books are listed separately, so the two halves of a snapshot
//! may be a moment apart. Each record is read whole by the store.

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        BookId, BookView, InventorySnapshot, MemberId, MemberView, ReconciliationReport,
    },
    repository::{LedgerStore, StoreError},
};

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn LedgerStore>,
}

fn read_error(e: StoreError) -> AppError {
    AppError::ReadError(e.to_string())
}

impl QueryService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Every member and every book, ordered by id
    pub async fn list_all(&self) -> AppResult<InventorySnapshot> {
        let members = self.store.list_members().await.map_err(read_error)?;
        let books = self.store.list_books().await.map_err(read_error)?;
        Ok(InventorySnapshot::new(&members, &books))
    }

    pub async fn get_member(&self, id: &MemberId) -> AppResult<MemberView> {
        self.store
            .get_member(id)
            .await
            .map_err(read_error)?
            .map(|m| MemberView::from(&m))
            .ok_or_else(|| AppError::MemberNotFound(id.clone()))
    }

    pub async fn get_book(&self, id: &BookId) -> AppResult<BookView> {
        self.store
            .get_book(id)
            .await
            .map_err(read_error)?
            .map(|b| BookView::from(&b))
            .ok_or_else(|| AppError::BookNotFound(id.clone()))
    }

    /// Cross-check member holds against book availability
    pub async fn reconcile(&self) -> AppResult<ReconciliationReport> {
        let members = self.store.list_members().await.map_err(read_error)?;
        let books = self.store.list_books().await.map_err(read_error)?;
        let report = ReconciliationReport::from_records(&members, &books);

        if !report.is_consistent() {
            tracing::warn!(
                discrepancies = report.discrepancies.len(),
                "Ledger reconciliation found discrepancies"
            );
        }
        Ok(report)
    }

    /// Store reachability, for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await.map_err(read_error)
    }
}
