//! PostgreSQL ledger store
//!
//! Conditional updates compare the `version` column in the `WHERE` clause, so
//! the database serializes competing writers for us.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};

use super::{LedgerStore, LoanVersions, LoanWrite, StoreError, StoreResult};
use crate::models::{Book, BookId, Member, MemberId};

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn member_exists(&self, id: &MemberId) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM members WHERE member_id = $1)")
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn book_exists(&self, id: &BookId) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE book_id = $1)")
                .bind(id.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

/// Tell a lost version race apart from a missing row after a zero-row write.
fn classify_miss(exists: bool) -> StoreError {
    if exists {
        StoreError::VersionConflict
    } else {
        StoreError::NotFound
    }
}

const UPDATE_MEMBER: &str = r#"
    UPDATE members
    SET name = $2, held_books = $3, version = version + 1
    WHERE member_id = $1 AND version = $4
    RETURNING version
"#;

const UPDATE_BOOK: &str = r#"
    UPDATE books
    SET title = $2, author = $3, available = $4, version = version + 1
    WHERE book_id = $1 AND version = $5
    RETURNING version
"#;

fn version_to_db(version: u64) -> StoreResult<i64> {
    i64::try_from(version).map_err(|_| StoreError::Unavailable(format!("version {} overflows", version)))
}

fn version_from_db(version: i64) -> StoreResult<u64> {
    u64::try_from(version).map_err(|_| StoreError::Unavailable(format!("negative version {}", version)))
}

fn count_from_db(column: &str, value: i64) -> StoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Unavailable(format!("{} out of range: {}", column, value)))
}

fn held_books_to_db(member: &Member) -> Vec<String> {
    member.held_books.iter().map(ToString::to_string).collect()
}

fn member_from_row(row: &PgRow) -> StoreResult<Member> {
    let member_id: String = row.try_get("member_id")?;
    let held: Vec<String> = row.try_get("held_books")?;
    let registered_at: DateTime<Utc> = row.try_get("registered_at")?;

    let held_books = held
        .iter()
        .map(|id| BookId::parse(id))
        .collect::<Result<_, _>>()
        .map_err(|e| StoreError::Unavailable(format!("corrupt held_books: {}", e)))?;

    Ok(Member {
        member_id: MemberId::parse(&member_id)
            .map_err(|e| StoreError::Unavailable(format!("corrupt member_id: {}", e)))?,
        name: row.try_get("name")?,
        held_books,
        version: version_from_db(row.try_get("version")?)?,
        registered_at,
    })
}

fn book_from_row(row: &PgRow) -> StoreResult<Book> {
    let book_id: String = row.try_get("book_id")?;

    Ok(Book {
        book_id: BookId::parse(&book_id)
            .map_err(|e| StoreError::Unavailable(format!("corrupt book_id: {}", e)))?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        total_quantity: count_from_db("total_quantity", row.try_get("total_quantity")?)?,
        available: count_from_db("available", row.try_get("available")?)?,
        version: version_from_db(row.try_get("version")?)?,
        added_at: row.try_get("added_at")?,
    })
}

#[async_trait]
impl LedgerStore for PgStore {
    fn supports_multi_record(&self) -> bool {
        true
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_member(&self, id: &MemberId) -> StoreResult<Option<Member>> {
        let row = sqlx::query("SELECT * FROM members WHERE member_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(member_from_row).transpose()
    }

    async fn get_book(&self, id: &BookId) -> StoreResult<Option<Book>> {
        let row = sqlx::query("SELECT * FROM books WHERE book_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(book_from_row).transpose()
    }

    async fn insert_member(&self, member: &Member) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO members (member_id, name, held_books, version, registered_at)
            VALUES ($1, $2, $3, 1, $4)
            ON CONFLICT (member_id) DO NOTHING
            "#,
        )
        .bind(member.member_id.as_str())
        .bind(&member.name)
        .bind(held_books_to_db(member))
        .bind(member.registered_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists);
        }
        Ok(1)
    }

    async fn insert_book(&self, book: &Book) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO books (book_id, title, author, total_quantity, available, version, added_at)
            VALUES ($1, $2, $3, $4, $5, 1, $6)
            ON CONFLICT (book_id) DO NOTHING
            "#,
        )
        .bind(book.book_id.as_str())
        .bind(&book.title)
        .bind(&book.author)
        .bind(i64::from(book.total_quantity))
        .bind(i64::from(book.available))
        .bind(book.added_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists);
        }
        Ok(1)
    }

    async fn update_member(&self, member: &Member) -> StoreResult<u64> {
        let version: Option<i64> = sqlx::query_scalar(UPDATE_MEMBER)
            .bind(member.member_id.as_str())
            .bind(&member.name)
            .bind(held_books_to_db(member))
            .bind(version_to_db(member.version)?)
            .fetch_optional(&self.pool)
            .await?;

        match version {
            Some(v) => version_from_db(v),
            None => {
                let exists = self.member_exists(&member.member_id).await?;
                Err(classify_miss(exists))
            }
        }
    }

    async fn update_book(&self, book: &Book) -> StoreResult<u64> {
        let version: Option<i64> = sqlx::query_scalar(UPDATE_BOOK)
            .bind(book.book_id.as_str())
            .bind(&book.title)
            .bind(&book.author)
            .bind(i64::from(book.available))
            .bind(version_to_db(book.version)?)
            .fetch_optional(&self.pool)
            .await?;

        match version {
            Some(v) => version_from_db(v),
            None => {
                let exists = self.book_exists(&book.book_id).await?;
                Err(classify_miss(exists))
            }
        }
    }

    async fn delete_member_if_idle(&self, id: &MemberId) -> StoreResult<()> {
        let result =
            sqlx::query("DELETE FROM members WHERE member_id = $1 AND cardinality(held_books) = 0")
                .bind(id.as_str())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(if self.member_exists(id).await? {
                StoreError::PredicateFailed
            } else {
                StoreError::NotFound
            });
        }
        Ok(())
    }

    async fn delete_book_if_shelved(&self, id: &BookId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE book_id = $1 AND available = total_quantity")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(if self.book_exists(id).await? {
                StoreError::PredicateFailed
            } else {
                StoreError::NotFound
            });
        }
        Ok(())
    }

    async fn commit_loan(&self, write: &LoanWrite) -> StoreResult<LoanVersions> {
        let mut tx = self.pool.begin().await?;

        let book_version: Option<i64> = sqlx::query_scalar(UPDATE_BOOK)
            .bind(write.book.book_id.as_str())
            .bind(&write.book.title)
            .bind(&write.book.author)
            .bind(i64::from(write.book.available))
            .bind(version_to_db(write.book.version)?)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(book_version) = book_version else {
            tx.rollback().await?;
            let exists = self.book_exists(&write.book.book_id).await?;
            return Err(classify_miss(exists));
        };

        let member_version: Option<i64> = sqlx::query_scalar(UPDATE_MEMBER)
            .bind(write.member.member_id.as_str())
            .bind(&write.member.name)
            .bind(held_books_to_db(&write.member))
            .bind(version_to_db(write.member.version)?)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(member_version) = member_version else {
            tx.rollback().await?;
            let exists = self.member_exists(&write.member.member_id).await?;
            return Err(classify_miss(exists));
        };

        tx.commit().await?;

        Ok(LoanVersions {
            member: version_from_db(member_version)?,
            book: version_from_db(book_version)?,
        })
    }

    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        let rows = sqlx::query("SELECT * FROM members ORDER BY member_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(member_from_row).collect()
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        let rows = sqlx::query("SELECT * FROM books ORDER BY book_id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(book_from_row).collect()
    }
}
