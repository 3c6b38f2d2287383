//! Inventory engine
//!
//! Sole writer of member and book records. Every operation reads the records
//! it needs, decides against that consistent read, and writes back with
//! version-guarded conditional updates. A lost race means the whole operation
//! starts over from a fresh read, up to `max_attempts` times.
//!
//! Stores with multi-record transactions get the member and book written in
//! one `commit_loan`. Without them, writes go one record at a time: book first
//! on issue, member first on return. Return reverses the order so a copy is
//! never back on the shelf while a member still holds it. A second write that
//! cannot be applied is compensated by undoing the first. If the undo itself
//! fails the caller gets [`AppError::PartialFailure`].
//!
//! Deadlines bound reads, backoff and atomic commits. Once the first of two
//! single-record writes is issued, the pair runs to completion (or is
//! compensated) in its own task; a deadline that passed meanwhile is reported
//! as [`AppError::Timeout`] afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    config::EngineConfig,
    error::{AppError, AppResult, ErrorKind},
    models::{Book, BookId, LoanReceipt, Member, MemberId},
    repository::{LedgerStore, LoanWrite, StoreError},
};

/// Point in time after which an operation gives up with [`AppError::Timeout`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

enum Attempt<T> {
    Done(T),
    Retry,
}

#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn LedgerStore>,
    config: EngineConfig,
}

impl InventoryService {
    pub fn new(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Deadline derived from `engine.operation_timeout_ms`
    pub fn default_deadline(&self) -> Deadline {
        self.config
            .operation_timeout()
            .map(Deadline::after)
            .unwrap_or_default()
    }

    /// Register a new member with no books on loan
    pub async fn register_member(
        &self,
        member_id: &MemberId,
        name: &str,
        deadline: Deadline,
    ) -> AppResult<Member> {
        self.within("register_member", deadline, async move {
            let mut member = Member::new(member_id.clone(), name);
            match self.store.insert_member(&member).await {
                Ok(version) => member.version = version,
                Err(StoreError::AlreadyExists) => {
                    return Err(AppError::MemberAlreadyExists(member_id.clone()))
                }
                Err(e) => return Err(e.into()),
            }

            info!(member_id = %member_id, "Member registered");
            Ok(member)
        })
        .await
    }

    /// Register a new title with `quantity` copies, all on the shelf
    pub async fn register_book(
        &self,
        book_id: &BookId,
        title: &str,
        author: &str,
        quantity: i64,
        deadline: Deadline,
    ) -> AppResult<Book> {
        self.within("register_book", deadline, async move {
            let mut book = Book::new(book_id.clone(), title, author, quantity)?;
            match self.store.insert_book(&book).await {
                Ok(version) => book.version = version,
                Err(StoreError::AlreadyExists) => {
                    return Err(AppError::BookAlreadyExists(book_id.clone()))
                }
                Err(e) => return Err(e.into()),
            }

            info!(book_id = %book_id, copies = book.total_quantity, "Book registered");
            Ok(book)
        })
        .await
    }

    /// Lend one copy of `book_id` to `member_id`
    pub async fn issue(
        &self,
        member_id: &MemberId,
        book_id: &BookId,
        deadline: Deadline,
    ) -> AppResult<LoanReceipt> {
        let result = async {
            if let Some(receipt) = self
                .retrying("issue", deadline, move || {
                    self.try_issue(member_id, book_id, deadline)
                })
                .await?
            {
                info!(
                    member_id = %member_id,
                    book_id = %book_id,
                    available = receipt.available,
                    "Book issued"
                );
                return Ok(receipt);
            }

            // Out of attempts: report exhaustion if that is what we lost to.
            let book = self.until(deadline, self.load_book(book_id)).await?;
            if book.available == 0 {
                return Err(AppError::NoCopiesAvailable(book_id.clone()));
            }
            Err(AppError::Conflict {
                attempts: self.max_attempts(),
            })
        }
        .await;

        self.outcome("issue", result)
    }

    /// Take back the copy of `book_id` held by `member_id`
    pub async fn return_book(
        &self,
        member_id: &MemberId,
        book_id: &BookId,
        deadline: Deadline,
    ) -> AppResult<LoanReceipt> {
        let result = match self
            .retrying("return", deadline, move || {
                self.try_return(member_id, book_id, deadline)
            })
            .await
        {
            Ok(Some(receipt)) => {
                info!(
                    member_id = %member_id,
                    book_id = %book_id,
                    available = receipt.available,
                    "Book returned"
                );
                Ok(receipt)
            }
            Ok(None) => Err(AppError::Conflict {
                attempts: self.max_attempts(),
            }),
            Err(e) => Err(e),
        };

        self.outcome("return", result)
    }

    /// Delete a member who holds no books
    pub async fn retire_member(&self, member_id: &MemberId, deadline: Deadline) -> AppResult<()> {
        self.within("retire_member", deadline, async move {
            match self
                .retrying("retire_member", deadline, move || {
                    self.try_retire_member(member_id)
                })
                .await?
            {
                Some(()) => {
                    info!(member_id = %member_id, "Member retired");
                    Ok(())
                }
                None => Err(AppError::Conflict {
                    attempts: self.max_attempts(),
                }),
            }
        })
        .await
    }

    /// Delete a book with every copy on the shelf
    pub async fn retire_book(&self, book_id: &BookId, deadline: Deadline) -> AppResult<()> {
        self.within("retire_book", deadline, async move {
            match self
                .retrying("retire_book", deadline, move || self.try_retire_book(book_id))
                .await?
            {
                Some(()) => {
                    info!(book_id = %book_id, "Book retired");
                    Ok(())
                }
                None => Err(AppError::Conflict {
                    attempts: self.max_attempts(),
                }),
            }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Single attempts
    // -----------------------------------------------------------------------

    async fn try_issue(
        &self,
        member_id: &MemberId,
        book_id: &BookId,
        deadline: Deadline,
    ) -> AppResult<Attempt<LoanReceipt>> {
        let (mut member, mut book) = self
            .until(deadline, self.load_pair(member_id, book_id))
            .await?;

        member.hold(book_id)?;
        book.take_copy()?;

        if self.store.supports_multi_record() {
            return self.commit(LoanWrite { member, book }, deadline).await;
        }

        let this = self.clone();
        self.one_by_one(deadline, async move {
            this.claim_then_hold(member, book).await
        })
        .await
    }

    async fn try_return(
        &self,
        member_id: &MemberId,
        book_id: &BookId,
        deadline: Deadline,
    ) -> AppResult<Attempt<LoanReceipt>> {
        let (mut member, mut book) = self
            .until(deadline, self.load_pair(member_id, book_id))
            .await?;

        member.release(book_id)?;
        book.restore_copy()?;

        if self.store.supports_multi_record() {
            return self.commit(LoanWrite { member, book }, deadline).await;
        }

        let this = self.clone();
        self.one_by_one(deadline, async move {
            this.release_then_credit(member, book).await
        })
        .await
    }

    async fn try_retire_member(&self, member_id: &MemberId) -> AppResult<Attempt<()>> {
        let member = self.load_member(member_id).await?;
        if !member.is_idle() {
            return Err(AppError::MemberHasOutstandingLoans {
                member_id: member_id.clone(),
                book_ids: member.held_book_ids(),
            });
        }

        match self.store.delete_member_if_idle(member_id).await {
            Ok(()) => Ok(Attempt::Done(())),
            // A loan landed between our read and the delete; re-read to report it.
            Err(StoreError::PredicateFailed) => Ok(Attempt::Retry),
            Err(StoreError::NotFound) => Err(AppError::MemberNotFound(member_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_retire_book(&self, book_id: &BookId) -> AppResult<Attempt<()>> {
        let book = self.load_book(book_id).await?;
        if book.has_outstanding_loans() {
            return Err(AppError::BookHasOutstandingLoans {
                book_id: book_id.clone(),
                outstanding: book.outstanding(),
            });
        }

        match self.store.delete_book_if_shelved(book_id).await {
            Ok(()) => Ok(Attempt::Done(())),
            Err(StoreError::PredicateFailed) => Ok(Attempt::Retry),
            Err(StoreError::NotFound) => Err(AppError::BookNotFound(book_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Loan writes
    // -----------------------------------------------------------------------

    /// Write member and book in one transaction. Cancelling it is safe.
    async fn commit(&self, write: LoanWrite, deadline: Deadline) -> AppResult<Attempt<LoanReceipt>> {
        let committed = self
            .until(deadline, async {
                self.store.commit_loan(&write).await.map_err(AppError::from)
            })
            .await;

        match committed {
            Ok(versions) => {
                let LoanWrite {
                    mut member,
                    mut book,
                } = write;
                member.version = versions.member;
                book.version = versions.book;
                Ok(Attempt::Done(LoanReceipt::new(&member, &book)))
            }
            Err(AppError::Store(StoreError::VersionConflict | StoreError::NotFound)) => {
                Ok(Attempt::Retry)
            }
            Err(e) => Err(e),
        }
    }

    /// Run a pair of single-record writes outside the caller's future.
    ///
    /// Nothing is written once the deadline has passed. After the first write
    /// the pair is never abandoned half way, even if the caller is dropped.
    async fn one_by_one<F>(&self, deadline: Deadline, writes: F) -> AppResult<Attempt<LoanReceipt>>
    where
        F: Future<Output = AppResult<Attempt<LoanReceipt>>> + Send + 'static,
    {
        if deadline.expired() {
            return Err(AppError::Timeout);
        }

        let outcome = tokio::spawn(writes)
            .await
            .map_err(|e| self.partial_failure(format!("loan write task did not finish: {}", e)))?;

        if matches!(outcome, Ok(Attempt::Done(_))) && deadline.expired() {
            warn!("Loan applied after its deadline passed");
            return Err(AppError::Timeout);
        }
        outcome
    }

    /// Issue on a single-record store: claim the copy, then add the hold.
    async fn claim_then_hold(&self, member: Member, mut book: Book) -> AppResult<Attempt<LoanReceipt>> {
        let book_id = book.book_id.clone();

        match self.store.update_book(&book).await {
            Ok(version) => book.version = version,
            Err(StoreError::VersionConflict | StoreError::NotFound) => return Ok(Attempt::Retry),
            Err(e) => return Err(e.into()),
        }

        match self.attach_hold(member, &book_id).await {
            Ok(member) => Ok(Attempt::Done(LoanReceipt::new(&member, &book))),
            Err(err @ AppError::PartialFailure(_)) => Err(err),
            Err(err) => {
                warn!(book_id = %book_id, "Member update failed after copy was claimed, compensating: {}", err);
                self.shelve_copy(book).await?;
                match err {
                    AppError::Conflict { .. } => Ok(Attempt::Retry),
                    other => Err(other),
                }
            }
        }
    }

    /// Return on a single-record store: release the hold, then credit the copy.
    async fn release_then_credit(
        &self,
        mut member: Member,
        book: Book,
    ) -> AppResult<Attempt<LoanReceipt>> {
        let book_id = book.book_id.clone();

        match self.store.update_member(&member).await {
            Ok(version) => member.version = version,
            Err(StoreError::VersionConflict | StoreError::NotFound) => return Ok(Attempt::Retry),
            Err(e) => return Err(e.into()),
        }

        match self.credit_copy(book).await {
            Ok(book) => Ok(Attempt::Done(LoanReceipt::new(&member, &book))),
            Err(err @ AppError::PartialFailure(_)) => Err(err),
            Err(err) => {
                warn!(member_id = %member.member_id, "Book update failed after hold was released, compensating: {}", err);
                self.reinstate_hold(member, &book_id).await?;
                match err {
                    AppError::Conflict { .. } => Ok(Attempt::Retry),
                    other => Err(other),
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Second writes and compensations (single-record stores)
    // -----------------------------------------------------------------------

    /// Add the hold on `book_id`, re-reading the member on version conflicts.
    async fn attach_hold(&self, mut member: Member, book_id: &BookId) -> AppResult<Member> {
        for attempt in 1..=self.max_attempts() {
            match self.store.update_member(&member).await {
                Ok(version) => {
                    member.version = version;
                    return Ok(member);
                }
                Err(StoreError::VersionConflict) => {
                    member = self.load_member(&member.member_id).await?;
                    member.hold(book_id)?;
                }
                Err(StoreError::NotFound) => {
                    return Err(AppError::MemberNotFound(member.member_id.clone()))
                }
                Err(e) => {
                    // The write may have landed; look before undoing anything.
                    let fresh = self.store.get_member(&member.member_id).await;
                    return match fresh {
                        Ok(Some(fresh)) if fresh.version == member.version => Err(e.into()),
                        Ok(Some(fresh))
                            if fresh.version == member.version + 1
                                && fresh.held_books == member.held_books =>
                        {
                            Ok(fresh)
                        }
                        _ => Err(self.partial_failure(format!(
                            "copy of book {} was claimed but the hold of member {} is in an unknown state ({})",
                            book_id, member.member_id, e
                        ))),
                    };
                }
            }
            self.backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: self.max_attempts(),
        })
    }

    /// Put back one copy of `book`, re-reading it on version conflicts.
    async fn credit_copy(&self, mut book: Book) -> AppResult<Book> {
        for attempt in 1..=self.max_attempts() {
            match self.store.update_book(&book).await {
                Ok(version) => {
                    book.version = version;
                    return Ok(book);
                }
                Err(StoreError::VersionConflict) => {
                    book = self.load_book(&book.book_id).await?;
                    book.restore_copy()?;
                }
                Err(StoreError::NotFound) => {
                    return Err(AppError::BookNotFound(book.book_id.clone()))
                }
                Err(e) => {
                    let fresh = self.store.get_book(&book.book_id).await;
                    return match fresh {
                        Ok(Some(fresh)) if fresh.version == book.version => Err(e.into()),
                        Ok(Some(fresh))
                            if fresh.version == book.version + 1
                                && fresh.available == book.available =>
                        {
                            Ok(fresh)
                        }
                        _ => Err(self.partial_failure(format!(
                            "hold on book {} was released but its copy count is in an unknown state ({})",
                            book.book_id, e
                        ))),
                    };
                }
            }
            self.backoff(attempt).await;
        }

        Err(AppError::Conflict {
            attempts: self.max_attempts(),
        })
    }

    /// Undo a claimed copy after the member write failed.
    async fn shelve_copy(&self, mut book: Book) -> AppResult<()> {
        let book_id = book.book_id.clone();
        for attempt in 1..=self.max_attempts() {
            let mut restored = book.clone();
            if restored.restore_copy().is_err() {
                break;
            }
            match self.store.update_book(&restored).await {
                Ok(_) => {
                    warn!(book_id = %book_id, "Compensated claimed copy");
                    return Ok(());
                }
                Err(StoreError::VersionConflict) => match self.store.get_book(&book_id).await {
                    Ok(Some(fresh)) => book = fresh,
                    _ => break,
                },
                Err(_) => break,
            }
            self.backoff(attempt).await;
        }

        Err(self.partial_failure(format!(
            "book {} is missing one copy that no member holds",
            book_id
        )))
    }

    /// Undo a released hold after the book write failed.
    async fn reinstate_hold(&self, mut member: Member, book_id: &BookId) -> AppResult<()> {
        let member_id = member.member_id.clone();
        for attempt in 1..=self.max_attempts() {
            let mut restored = member.clone();
            if restored.hold(book_id).is_err() {
                break;
            }
            match self.store.update_member(&restored).await {
                Ok(_) => {
                    warn!(member_id = %member_id, book_id = %book_id, "Compensated released hold");
                    return Ok(());
                }
                Err(StoreError::VersionConflict) => match self.store.get_member(&member_id).await {
                    Ok(Some(fresh)) => member = fresh,
                    _ => break,
                },
                Err(_) => break,
            }
            self.backoff(attempt).await;
        }

        Err(self.partial_failure(format!(
            "member {} returned book {} but the copy was not put back on the shelf",
            member_id, book_id
        )))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load_member(&self, id: &MemberId) -> AppResult<Member> {
        self.store
            .get_member(id)
            .await?
            .ok_or_else(|| AppError::MemberNotFound(id.clone()))
    }

    async fn load_book(&self, id: &BookId) -> AppResult<Book> {
        self.store
            .get_book(id)
            .await?
            .ok_or_else(|| AppError::BookNotFound(id.clone()))
    }

    async fn load_pair(&self, member_id: &MemberId, book_id: &BookId) -> AppResult<(Member, Book)> {
        let member = self.load_member(member_id).await?;
        let book = self.load_book(book_id).await?;
        Ok((member, book))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    async fn backoff(&self, attempt: u32) {
        let pause = self.config.retry_backoff() * attempt;
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    fn partial_failure(&self, message: String) -> AppError {
        error!("Ledger left inconsistent: {}", message);
        AppError::PartialFailure(message)
    }

    /// Run `attempt` until it finishes, the attempt budget is spent or the
    /// deadline passes.
    async fn retrying<T, F, Fut>(
        &self,
        op: &'static str,
        deadline: Deadline,
        mut attempt: F,
    ) -> AppResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<Attempt<T>>>,
    {
        for n in 1..=self.max_attempts() {
            if deadline.expired() {
                return Err(AppError::Timeout);
            }
            match attempt().await? {
                Attempt::Done(value) => return Ok(Some(value)),
                Attempt::Retry => {
                    debug!(op, attempt = n, "Version conflict, retrying");
                    self.until(deadline, async {
                        self.backoff(n).await;
                        Ok(())
                    })
                    .await?;
                }
            }
        }
        warn!(op, attempts = self.max_attempts(), "Retry budget exhausted");
        Ok(None)
    }

    /// Abandon `fut` with [`AppError::Timeout`] once the deadline passes.
    async fn until<T, Fut>(&self, deadline: Deadline, fut: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        match deadline.instant() {
            Some(at) => tokio::time::timeout_at(at, fut)
                .await
                .unwrap_or(Err(AppError::Timeout)),
            None => fut.await,
        }
    }

    /// Bound a single-write operation by the deadline and log the outcome.
    async fn within<T, Fut>(&self, op: &'static str, deadline: Deadline, fut: Fut) -> AppResult<T>
    where
        Fut: Future<Output = AppResult<T>>,
    {
        let result = self.until(deadline, fut).await;
        self.outcome(op, result)
    }

    fn outcome<T>(&self, op: &'static str, result: AppResult<T>) -> AppResult<T> {
        if let Err(err) = &result {
            match err.kind() {
                ErrorKind::Infrastructure => error!(op, "Operation failed: {}", err),
                ErrorKind::PartialFailure => error!(op, "Operation left ledger inconsistent: {}", err),
                ErrorKind::Concurrency => warn!(op, "Operation gave up: {}", err),
                _ => debug!(op, "Operation rejected: {}", err),
            }
        }
        result
    }
}
