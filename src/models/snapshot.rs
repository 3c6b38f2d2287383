//! Point-in-time inventory listing and consistency report

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    book::{Book, BookView},
    ids::BookId,
    member::{Member, MemberView},
};

/// Everything in the ledger, ordered by id
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventorySnapshot {
    pub members: Vec<MemberView>,
    pub books: Vec<BookView>,
    pub taken_at: DateTime<Utc>,
}

impl InventorySnapshot {
    pub fn new(members: &[Member], books: &[Book]) -> Self {
        let mut members: Vec<MemberView> = members.iter().map(MemberView::from).collect();
        let mut books: Vec<BookView> = books.iter().map(BookView::from).collect();
        members.sort_by(|a, b| a.member_id.cmp(&b.member_id));
        books.sort_by(|a, b| a.book_id.cmp(&b.book_id));

        Self {
            members,
            books,
            taken_at: Utc::now(),
        }
    }
}

/// A single disagreement between member holds and book availability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// `total_quantity - available` differs from the number of holders.
    LoanCountMismatch {
        book_id: String,
        outstanding: u32,
        holders: u32,
    },
    /// `available` exceeds `total_quantity`.
    AvailabilityOutOfRange {
        book_id: String,
        available: u32,
        total_quantity: u32,
    },
    /// A member holds a book that is not in the ledger.
    DanglingHold { member_id: String, book_id: String },
}

/// Result of cross-checking every member against every book
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationReport {
    pub members_checked: usize,
    pub books_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
    pub checked_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn from_records(members: &[Member], books: &[Book]) -> Self {
        let known: BTreeSet<&BookId> = books.iter().map(|b| &b.book_id).collect();
        let mut holders: BTreeMap<&BookId, u32> = BTreeMap::new();
        let mut discrepancies = Vec::new();

        for member in members {
            for book_id in &member.held_books {
                if known.contains(book_id) {
                    *holders.entry(book_id).or_default() += 1;
                } else {
                    discrepancies.push(Discrepancy::DanglingHold {
                        member_id: member.member_id.to_string(),
                        book_id: book_id.to_string(),
                    });
                }
            }
        }

        for book in books {
            if book.available > book.total_quantity {
                discrepancies.push(Discrepancy::AvailabilityOutOfRange {
                    book_id: book.book_id.to_string(),
                    available: book.available,
                    total_quantity: book.total_quantity,
                });
                continue;
            }
            let held = holders.get(&book.book_id).copied().unwrap_or(0);
            if held != book.outstanding() {
                discrepancies.push(Discrepancy::LoanCountMismatch {
                    book_id: book.book_id.to_string(),
                    outstanding: book.outstanding(),
                    holders: held,
                });
            }
        }

        Self {
            members_checked: members.len(),
            books_checked: books.len(),
            discrepancies,
            checked_at: Utc::now(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}
