//! Member (borrower) model and related types

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{BookId, MemberId};
use crate::error::{AppError, AppResult};

/// Member record as held by the ledger store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub name: String,
    /// Titles currently on loan to this member, at most one copy each.
    pub held_books: BTreeSet<BookId>,
    /// Store-assigned optimistic concurrency token.
    pub version: u64,
    pub registered_at: DateTime<Utc>,
}

impl Member {
    pub fn new(member_id: MemberId, name: &str) -> Self {
        Self {
            member_id,
            name: name.trim().to_string(),
            held_books: BTreeSet::new(),
            version: 0,
            registered_at: Utc::now(),
        }
    }

    pub fn holds(&self, book_id: &BookId) -> bool {
        self.held_books.contains(book_id)
    }

    /// True when the member has nothing on loan and may be retired.
    pub fn is_idle(&self) -> bool {
        self.held_books.is_empty()
    }

    /// Record a new hold on `book_id`.
    pub fn hold(&mut self, book_id: &BookId) -> AppResult<()> {
        if !self.held_books.insert(book_id.clone()) {
            return Err(AppError::AlreadyHeld {
                member_id: self.member_id.clone(),
                book_id: book_id.clone(),
            });
        }
        Ok(())
    }

    /// Drop the hold on `book_id`.
    pub fn release(&mut self, book_id: &BookId) -> AppResult<()> {
        if !self.held_books.remove(book_id) {
            return Err(AppError::NotIssuedToMember {
                member_id: self.member_id.clone(),
                book_id: book_id.clone(),
            });
        }
        Ok(())
    }

    pub fn held_book_ids(&self) -> Vec<BookId> {
        self.held_books.iter().cloned().collect()
    }
}

/// Read-only projection of a member for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MemberView {
    pub member_id: String,
    pub name: String,
    pub held_books: Vec<String>,
}

impl From<&Member> for MemberView {
    fn from(member: &Member) -> Self {
        Self {
            member_id: member.member_id.to_string(),
            name: member.name.clone(),
            held_books: member.held_books.iter().map(ToString::to_string).collect(),
        }
    }
}
