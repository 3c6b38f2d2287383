//! Book (title with a finite number of copies) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::BookId;
use crate::error::{AppError, AppResult};

/// Book record as held by the ledger store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    /// Copies ever added; fixed at registration.
    pub total_quantity: u32,
    /// Copies currently on the shelf.
    pub available: u32,
    /// Store-assigned optimistic concurrency token.
    pub version: u64,
    pub added_at: DateTime<Utc>,
}

impl Book {
    /// Build a new book with every copy on the shelf.
    ///
    /// The quantity arrives as a signed integer from the caller and must fit
    /// in `0..=u32::MAX`.
    pub fn new(book_id: BookId, title: &str, author: &str, quantity: i64) -> AppResult<Self> {
        let total_quantity =
            u32::try_from(quantity).map_err(|_| AppError::InvalidQuantity(quantity))?;

        Ok(Self {
            book_id,
            title: title.trim().to_string(),
            author: author.trim().to_string(),
            total_quantity,
            available: total_quantity,
            version: 0,
            added_at: Utc::now(),
        })
    }

    /// Number of copies currently out on loan
    pub fn outstanding(&self) -> u32 {
        self.total_quantity.saturating_sub(self.available)
    }

    pub fn has_outstanding_loans(&self) -> bool {
        self.available < self.total_quantity
    }

    /// Take one copy off the shelf.
    pub fn take_copy(&mut self) -> AppResult<()> {
        if self.available == 0 {
            return Err(AppError::NoCopiesAvailable(self.book_id.clone()));
        }
        self.available -= 1;
        Ok(())
    }

    /// Put one copy back on the shelf.
    ///
    /// A full shelf means the ledger already disagrees with a member's holds.
    pub fn restore_copy(&mut self) -> AppResult<()> {
        if self.available >= self.total_quantity {
            return Err(AppError::Inconsistent(format!(
                "book {} has all {} copies on the shelf, cannot take one back",
                self.book_id, self.total_quantity
            )));
        }
        self.available += 1;
        Ok(())
    }
}

/// Read-only projection of a book for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookView {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub total_quantity: u32,
    pub available: u32,
}

impl From<&Book> for BookView {
    fn from(book: &Book) -> Self {
        Self {
            book_id: book.book_id.to_string(),
            title: book.title.clone(),
            author: book.author.clone(),
            total_quantity: book.total_quantity,
            available: book.available,
        }
    }
}
