//! Loan (issue / return) results
//!
//! A loan is not stored on its own: it is the pair of a member's hold and the
//! matching missing copy on the book record.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{book::Book, member::Member};

/// Outcome of a successful issue or return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoanReceipt {
    pub member_id: String,
    pub member_name: String,
    pub book_id: String,
    pub title: String,
    /// Copies on the shelf right after the operation.
    pub available: u32,
}

impl LoanReceipt {
    pub fn new(member: &Member, book: &Book) -> Self {
        Self {
            member_id: member.member_id.to_string(),
            member_name: member.name.clone(),
            book_id: book.book_id.to_string(),
            title: book.title.clone(),
            available: book.available,
        }
    }
}
