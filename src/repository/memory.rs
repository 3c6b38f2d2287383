//! In-process ledger store
//!
//! Every method runs inside a single critical section, which makes each call
//! linearizable. Intended for tests, development and single-node deployments.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{LedgerStore, LoanVersions, LoanWrite, StoreError, StoreResult};
use crate::models::{Book, BookId, Member, MemberId};

#[derive(Debug, Default)]
struct Tables {
    members: BTreeMap<MemberId, Member>,
    books: BTreeMap<BookId, Book>,
}

#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    multi_record: bool,
    offline: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store with multi-record transactions.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            multi_record: true,
            offline: AtomicBool::new(false),
        }
    }

    /// Store limited to single-record atomic writes.
    pub fn single_record() -> Self {
        Self {
            multi_record: false,
            ..Self::new()
        }
    }

    /// Simulate an unreachable store: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

fn check_version(stored: u64, expected: u64) -> StoreResult<()> {
    if stored != expected {
        return Err(StoreError::VersionConflict);
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn supports_multi_record(&self) -> bool {
        self.multi_record
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_online()
    }

    async fn get_member(&self, id: &MemberId) -> StoreResult<Option<Member>> {
        self.check_online()?;
        Ok(self.tables.read().members.get(id).cloned())
    }

    async fn get_book(&self, id: &BookId) -> StoreResult<Option<Book>> {
        self.check_online()?;
        Ok(self.tables.read().books.get(id).cloned())
    }

    async fn insert_member(&self, member: &Member) -> StoreResult<u64> {
        self.check_online()?;
        let mut tables = self.tables.write();
        if tables.members.contains_key(&member.member_id) {
            return Err(StoreError::AlreadyExists);
        }
        let mut stored = member.clone();
        stored.version = 1;
        tables.members.insert(stored.member_id.clone(), stored);
        Ok(1)
    }

    async fn insert_book(&self, book: &Book) -> StoreResult<u64> {
        self.check_online()?;
        let mut tables = self.tables.write();
        if tables.books.contains_key(&book.book_id) {
            return Err(StoreError::AlreadyExists);
        }
        let mut stored = book.clone();
        stored.version = 1;
        tables.books.insert(stored.book_id.clone(), stored);
        Ok(1)
    }

    async fn update_member(&self, member: &Member) -> StoreResult<u64> {
        self.check_online()?;
        let mut tables = self.tables.write();
        let stored = tables
            .members
            .get_mut(&member.member_id)
            .ok_or(StoreError::NotFound)?;
        check_version(stored.version, member.version)?;

        *stored = member.clone();
        stored.version = member.version + 1;
        Ok(stored.version)
    }

    async fn update_book(&self, book: &Book) -> StoreResult<u64> {
        self.check_online()?;
        let mut tables = self.tables.write();
        let stored = tables.books.get_mut(&book.book_id).ok_or(StoreError::NotFound)?;
        check_version(stored.version, book.version)?;

        *stored = book.clone();
        stored.version = book.version + 1;
        Ok(stored.version)
    }

    async fn delete_member_if_idle(&self, id: &MemberId) -> StoreResult<()> {
        self.check_online()?;
        let mut tables = self.tables.write();
        let member = tables.members.get(id).ok_or(StoreError::NotFound)?;
        if !member.is_idle() {
            return Err(StoreError::PredicateFailed);
        }
        tables.members.remove(id);
        Ok(())
    }

    async fn delete_book_if_shelved(&self, id: &BookId) -> StoreResult<()> {
        self.check_online()?;
        let mut tables = self.tables.write();
        let book = tables.books.get(id).ok_or(StoreError::NotFound)?;
        if book.has_outstanding_loans() {
            return Err(StoreError::PredicateFailed);
        }
        tables.books.remove(id);
        Ok(())
    }

    async fn commit_loan(&self, write: &LoanWrite) -> StoreResult<LoanVersions> {
        if !self.multi_record {
            return Err(StoreError::Unavailable(
                "multi-record transactions are disabled".to_string(),
            ));
        }
        self.check_online()?;

        let mut tables = self.tables.write();
        let member_version = tables
            .members
            .get(&write.member.member_id)
            .ok_or(StoreError::NotFound)?
            .version;
        let book_version = tables
            .books
            .get(&write.book.book_id)
            .ok_or(StoreError::NotFound)?
            .version;
        check_version(member_version, write.member.version)?;
        check_version(book_version, write.book.version)?;

        let versions = LoanVersions {
            member: member_version + 1,
            book: book_version + 1,
        };

        let mut member = write.member.clone();
        member.version = versions.member;
        let mut book = write.book.clone();
        book.version = versions.book;
        tables.members.insert(member.member_id.clone(), member);
        tables.books.insert(book.book_id.clone(), book);

        Ok(versions)
    }

    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        self.check_online()?;
        Ok(self.tables.read().members.values().cloned().collect())
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        self.check_online()?;
        Ok(self.tables.read().books.values().cloned().collect())
    }
}
