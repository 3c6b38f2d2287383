//! Inventory engine integration tests against the in-memory store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lending_ledger::{
    config::EngineConfig,
    error::{AppError, ErrorKind},
    models::{Book, BookId, Member, MemberId},
    repository::{LedgerStore, LoanVersions, LoanWrite, MemoryStore, StoreResult},
    services::{Deadline, InventoryService, QueryService},
};

fn engine_config() -> EngineConfig {
    EngineConfig {
        max_attempts: 8,
        retry_backoff_ms: 1,
        operation_timeout_ms: 0,
    }
}

fn setup(store: MemoryStore) -> (InventoryService, QueryService, Arc<MemoryStore>) {
    let store = Arc::new(store);
    (
        InventoryService::new(store.clone(), engine_config()),
        QueryService::new(store.clone()),
        store,
    )
}

fn member(id: &str) -> MemberId {
    MemberId::parse(id).unwrap()
}

fn book(id: &str) -> BookId {
    BookId::parse(id).unwrap()
}

async fn available(store: &MemoryStore, id: &str) -> u32 {
    store.get_book(&book(id)).await.unwrap().unwrap().available
}

/// Dune with two copies and Alice registered.
async fn seed(engine: &InventoryService) {
    engine
        .register_book(&book("B1"), "Dune", "Herbert", 2, Deadline::none())
        .await
        .unwrap();
    engine
        .register_member(&member("M1"), "Alice", Deadline::none())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_scenario_a_issue_and_duplicate_hold() {
    for store in [MemoryStore::new(), MemoryStore::single_record()] {
        let (engine, query, store) = setup(store);
        seed(&engine).await;

        let receipt = engine
            .issue(&member("M1"), &book("B1"), Deadline::none())
            .await
            .unwrap();
        assert_eq!(receipt.title, "Dune");
        assert_eq!(receipt.member_name, "Alice");
        assert_eq!(receipt.available, 1);
        assert_eq!(available(&store, "B1").await, 1);

        let again = engine
            .issue(&member("M1"), &book("B1"), Deadline::none())
            .await;
        assert!(matches!(again, Err(AppError::AlreadyHeld { .. })));
        assert_eq!(available(&store, "B1").await, 1);
        assert!(query.reconcile().await.unwrap().is_consistent());
    }
}

#[tokio::test]
async fn test_scenario_b_return_of_book_never_issued() {
    let (engine, _, _) = setup(MemoryStore::new());
    seed(&engine).await;
    engine
        .register_book(&book("B2"), "Emma", "Austen", 1, Deadline::none())
        .await
        .unwrap();

    let result = engine
        .return_book(&member("M1"), &book("B2"), Deadline::none())
        .await;
    assert!(matches!(result, Err(AppError::NotIssuedToMember { .. })));
}

#[tokio::test]
async fn test_scenario_c_retire_book_with_outstanding_loans() {
    let (engine, _, store) = setup(MemoryStore::new());
    seed(&engine).await;
    engine
        .issue(&member("M1"), &book("B1"), Deadline::none())
        .await
        .unwrap();

    let result = engine.retire_book(&book("B1"), Deadline::none()).await;
    match result {
        Err(AppError::BookHasOutstandingLoans { outstanding, .. }) => assert_eq!(outstanding, 1),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(store.get_book(&book("B1")).await.unwrap().is_some());

    engine
        .return_book(&member("M1"), &book("B1"), Deadline::none())
        .await
        .unwrap();
    engine.retire_book(&book("B1"), Deadline::none()).await.unwrap();
    assert!(store.get_book(&book("B1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_scenario_d_retire_member_with_holds() {
    let (engine, _, store) = setup(MemoryStore::single_record());
    seed(&engine).await;
    engine
        .issue(&member("M1"), &book("B1"), Deadline::none())
        .await
        .unwrap();

    let result = engine.retire_member(&member("M1"), Deadline::none()).await;
    match result {
        Err(AppError::MemberHasOutstandingLoans { book_ids, .. }) => {
            assert_eq!(book_ids, vec![book("B1")])
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    engine
        .return_book(&member("M1"), &book("B1"), Deadline::none())
        .await
        .unwrap();
    engine
        .retire_member(&member("M1"), Deadline::none())
        .await
        .unwrap();
    assert!(store.get_member(&member("M1")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_registration_errors() {
    let (engine, _, _) = setup(MemoryStore::new());
    seed(&engine).await;

    let dup_member = engine
        .register_member(&member("M1"), "Bob", Deadline::none())
        .await;
    assert_eq!(dup_member.unwrap_err().kind(), ErrorKind::AlreadyExists);

    let dup_book = engine
        .register_book(&book("B1"), "Dune", "Herbert", 1, Deadline::none())
        .await;
    assert!(matches!(dup_book, Err(AppError::BookAlreadyExists(_))));

    let negative = engine
        .register_book(&book("B3"), "Ulysses", "Joyce", -2, Deadline::none())
        .await;
    assert!(matches!(negative, Err(AppError::InvalidQuantity(-2))));
}

#[tokio::test]
async fn test_missing_records() {
    let (engine, _, _) = setup(MemoryStore::new());
    seed(&engine).await;

    let no_member = engine
        .issue(&member("M9"), &book("B1"), Deadline::none())
        .await;
    assert!(matches!(no_member, Err(AppError::MemberNotFound(_))));

    let no_book = engine
        .issue(&member("M1"), &book("B9"), Deadline::none())
        .await;
    assert!(matches!(no_book, Err(AppError::BookNotFound(_))));

    let retire = engine.retire_member(&member("M9"), Deadline::none()).await;
    assert!(matches!(retire, Err(AppError::MemberNotFound(_))));
}

#[tokio::test]
async fn test_last_copy_is_exhausted() {
    let (engine, _, _) = setup(MemoryStore::new());
    engine
        .register_book(&book("B1"), "Dune", "Herbert", 1, Deadline::none())
        .await
        .unwrap();
    for id in ["M1", "M2"] {
        engine
            .register_member(&member(id), id, Deadline::none())
            .await
            .unwrap();
    }

    engine
        .issue(&member("M1"), &book("B1"), Deadline::none())
        .await
        .unwrap();
    let second = engine
        .issue(&member("M2"), &book("B1"), Deadline::none())
        .await;
    assert!(matches!(second, Err(AppError::NoCopiesAvailable(_))));
}

async fn race_for_last_copy(store: MemoryStore, contenders: usize) {
    let (engine, query, store) = setup(store);
    engine
        .register_book(&book("B1"), "Dune", "Herbert", 1, Deadline::none())
        .await
        .unwrap();
    for i in 0..contenders {
        engine
            .register_member(&member(&format!("M{}", i)), "Reader", Deadline::none())
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..contenders {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .issue(&member(&format!("M{}", i)), &book("B1"), Deadline::none())
                .await
        }));
    }

    let mut issued = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => issued += 1,
            Err(AppError::NoCopiesAvailable(_)) | Err(AppError::Conflict { .. }) => {}
            Err(other) => panic!("unexpected outcome: {:?}", other),
        }
    }

    assert_eq!(issued, 1);
    assert_eq!(available(&store, "B1").await, 0);
    assert!(query.reconcile().await.unwrap().is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issue_of_last_copy() {
    race_for_last_copy(MemoryStore::new(), 16).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issue_of_last_copy_without_transactions() {
    race_for_last_copy(MemoryStore::single_record(), 16).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_keeps_ledger_consistent() {
    for store in [MemoryStore::new(), MemoryStore::single_record()] {
        let (engine, query, _) = setup(store);
        for b in ["B1", "B2"] {
            engine
                .register_book(&book(b), "Title", "Author", 3, Deadline::none())
                .await
                .unwrap();
        }
        for i in 0..8 {
            engine
                .register_member(&member(&format!("M{}", i)), "Reader", Deadline::none())
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let m = member(&format!("M{}", i));
                for round in 0..10 {
                    let b = book(if (i + round) % 2 == 0 { "B1" } else { "B2" });
                    if engine.issue(&m, &b, Deadline::none()).await.is_ok() {
                        engine.return_book(&m, &b, Deadline::none()).await.unwrap();
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let report = query.reconcile().await.unwrap();
        assert!(report.is_consistent(), "{:?}", report.discrepancies);
        let snapshot = query.list_all().await.unwrap();
        assert!(snapshot.books.iter().all(|b| b.available == 3));
    }
}

/// Which write [`SlowAckStore`] applies and then stalls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlowWrite {
    Loan,
    Member,
    Book,
}

/// Store whose chosen write lands but takes too long to acknowledge.
struct SlowAckStore {
    inner: MemoryStore,
    slow: SlowWrite,
    delay: Duration,
}

impl SlowAckStore {
    async fn stall(&self, write: SlowWrite) {
        if self.slow == write {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl LedgerStore for SlowAckStore {
    fn supports_multi_record(&self) -> bool {
        self.inner.supports_multi_record()
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn get_member(&self, id: &MemberId) -> StoreResult<Option<Member>> {
        self.inner.get_member(id).await
    }

    async fn get_book(&self, id: &BookId) -> StoreResult<Option<Book>> {
        self.inner.get_book(id).await
    }

    async fn insert_member(&self, member: &Member) -> StoreResult<u64> {
        self.inner.insert_member(member).await
    }

    async fn insert_book(&self, book: &Book) -> StoreResult<u64> {
        self.inner.insert_book(book).await
    }

    async fn update_member(&self, member: &Member) -> StoreResult<u64> {
        let version = self.inner.update_member(member).await?;
        self.stall(SlowWrite::Member).await;
        Ok(version)
    }

    async fn update_book(&self, book: &Book) -> StoreResult<u64> {
        let version = self.inner.update_book(book).await?;
        self.stall(SlowWrite::Book).await;
        Ok(version)
    }

    async fn delete_member_if_idle(&self, id: &MemberId) -> StoreResult<()> {
        self.inner.delete_member_if_idle(id).await
    }

    async fn delete_book_if_shelved(&self, id: &BookId) -> StoreResult<()> {
        self.inner.delete_book_if_shelved(id).await
    }

    async fn commit_loan(&self, write: &LoanWrite) -> StoreResult<LoanVersions> {
        let versions = self.inner.commit_loan(write).await?;
        self.stall(SlowWrite::Loan).await;
        Ok(versions)
    }

    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        self.inner.list_members().await
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        self.inner.list_books().await
    }
}

/// Transactional store stalling on the commit, and single-record store
/// stalling on the second write of the given operation.
fn slow_stores(second_write: SlowWrite) -> Vec<Arc<SlowAckStore>> {
    [
        (MemoryStore::new(), SlowWrite::Loan),
        (MemoryStore::single_record(), second_write),
    ]
    .into_iter()
    .map(|(inner, slow)| {
        Arc::new(SlowAckStore {
            inner,
            slow,
            delay: Duration::from_millis(300),
        })
    })
    .collect()
}

fn short_deadline() -> Deadline {
    Deadline::after(Duration::from_millis(50))
}

#[tokio::test]
async fn test_retry_after_timeout_does_not_double_issue() {
    for store in slow_stores(SlowWrite::Member) {
        let engine = InventoryService::new(store.clone(), engine_config());
        let query = QueryService::new(store.clone());
        seed(&engine).await;

        let first = engine
            .issue(&member("M1"), &book("B1"), short_deadline())
            .await;
        assert!(matches!(first, Err(AppError::Timeout)), "{:?}", store.slow);

        // The loan landed whole even though the caller saw a timeout.
        assert!(query.reconcile().await.unwrap().is_consistent());
        assert_eq!(query.get_book(&book("B1")).await.unwrap().available, 1);
        assert_eq!(
            query.get_member(&member("M1")).await.unwrap().held_books,
            vec!["B1".to_string()]
        );

        let retry = engine
            .issue(&member("M1"), &book("B1"), Deadline::none())
            .await;
        assert!(matches!(retry, Err(AppError::AlreadyHeld { .. })));
        assert_eq!(query.get_book(&book("B1")).await.unwrap().available, 1);
        assert!(query.reconcile().await.unwrap().is_consistent());
    }
}

#[tokio::test]
async fn test_retry_after_timeout_does_not_double_return() {
    for store in slow_stores(SlowWrite::Book) {
        let engine = InventoryService::new(store.clone(), engine_config());
        let query = QueryService::new(store.clone());
        seed(&engine).await;
        engine
            .issue(&member("M1"), &book("B1"), Deadline::none())
            .await
            .unwrap();

        let first = engine
            .return_book(&member("M1"), &book("B1"), short_deadline())
            .await;
        assert!(matches!(first, Err(AppError::Timeout)), "{:?}", store.slow);

        assert!(query.reconcile().await.unwrap().is_consistent());
        assert_eq!(query.get_book(&book("B1")).await.unwrap().available, 2);

        let retry = engine
            .return_book(&member("M1"), &book("B1"), Deadline::none())
            .await;
        assert!(matches!(retry, Err(AppError::NotIssuedToMember { .. })));
        assert_eq!(query.get_book(&book("B1")).await.unwrap().available, 2);
        assert!(query.reconcile().await.unwrap().is_consistent());
    }
}

#[tokio::test]
async fn test_unreachable_store_surfaces_as_infrastructure() {
    let (engine, _, store) = setup(MemoryStore::new());
    seed(&engine).await;
    store.set_offline(true);

    let result = engine
        .issue(&member("M1"), &book("B1"), Deadline::none())
        .await;
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Infrastructure);
}
