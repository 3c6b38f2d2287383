//! Data models for the lending ledger

pub mod book;
pub mod ids;
pub mod loan;
pub mod member;
pub mod snapshot;

// Re-export commonly used types
pub use book::{Book, BookView};
pub use ids::{BookId, MemberId};
pub use loan::LoanReceipt;
pub use member::{Member, MemberView};
pub use snapshot::{Discrepancy, InventorySnapshot, ReconciliationReport};
