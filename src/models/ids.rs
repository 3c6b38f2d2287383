//! Identifiers for ledger records
//!
//! Ids are opaque, caller-assigned strings. Surrounding whitespace is dropped
//! and an empty id is rejected before any store access.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Longest id accepted by the ledger.
pub const MAX_ID_LEN: usize = 64;

fn normalize(kind: &str, raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{} id must not be empty", kind)));
    }
    if trimmed.chars().count() > MAX_ID_LEN {
        return Err(AppError::InvalidInput(format!(
            "{} id must be at most {} characters",
            kind, MAX_ID_LEN
        )));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// MemberId
// ---------------------------------------------------------------------------

/// Unique, immutable member identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn parse(raw: &str) -> AppResult<Self> {
        normalize("member", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// BookId
// ---------------------------------------------------------------------------

/// Unique, immutable book (title) identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    pub fn parse(raw: &str) -> AppResult<Self> {
        normalize("book", raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
