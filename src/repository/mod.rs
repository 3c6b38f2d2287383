//! Ledger store: durable keyed storage for member and book records
//!
//! The engine relies on every method below being atomic on its own. Updates
//! are conditional on the `version` carried by the record passed in; an
//! accepted write bumps the version by one and returns it.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::{
    config::{StoreBackend, StoreConfig},
    models::{Book, BookId, Member, MemberId},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Ledger store failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record already exists")]
    AlreadyExists,

    #[error("record not found")]
    NotFound,

    #[error("record version changed since it was read")]
    VersionConflict,

    #[error("delete predicate no longer holds")]
    PredicateFailed,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Member and book written together, each guarded by its own `version`
#[derive(Debug, Clone)]
pub struct LoanWrite {
    pub member: Member,
    pub book: Book,
}

/// Versions assigned by a committed [`LoanWrite`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanVersions {
    pub member: u64,
    pub book: u64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Whether [`LedgerStore::commit_loan`] is available.
    fn supports_multi_record(&self) -> bool;

    async fn ping(&self) -> StoreResult<()>;

    async fn get_member(&self, id: &MemberId) -> StoreResult<Option<Member>>;

    async fn get_book(&self, id: &BookId) -> StoreResult<Option<Book>>;

    /// Insert unless the id is taken; returns the assigned version.
    async fn insert_member(&self, member: &Member) -> StoreResult<u64>;

    async fn insert_book(&self, book: &Book) -> StoreResult<u64>;

    /// Replace the member if its stored version equals `member.version`.
    async fn update_member(&self, member: &Member) -> StoreResult<u64>;

    /// Replace the book if its stored version equals `book.version`.
    async fn update_book(&self, book: &Book) -> StoreResult<u64>;

    /// Delete the member if it holds no books.
    async fn delete_member_if_idle(&self, id: &MemberId) -> StoreResult<()>;

    /// Delete the book if every copy is on the shelf.
    async fn delete_book_if_shelved(&self, id: &BookId) -> StoreResult<()>;

    /// Apply both conditional updates or neither.
    async fn commit_loan(&self, write: &LoanWrite) -> StoreResult<LoanVersions>;

    /// All members ordered by id.
    async fn list_members(&self) -> StoreResult<Vec<Member>>;

    /// All books ordered by id.
    async fn list_books(&self) -> StoreResult<Vec<Book>>;
}

/// Build the store selected by configuration
pub async fn connect(config: &StoreConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory ledger store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .connect(&config.url)
                .await?;

            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&pool).await?;

            tracing::info!("Database migrations completed");

            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}
