//! Transactional store used by the borrow ledger.
//!
//! Every ledger operation runs inside one [`LedgerTx`]: rows are read with a
//! lock, checked, mutated and written back, then the transaction commits. A
//! transaction dropped without commit is rolled back.
//!
//! Row locks are always taken user → book (return: record → user → book) so
//! two ledger operations never wait on each other in opposite orders. Locks
//! are `FOR NO KEY UPDATE`: the ledger never changes a key column, and the
//! foreign-key checks of a concurrent record insert only need `FOR KEY SHARE`
//! on the same user or book rows.

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult, LedgerViolation},
    models::{
        book::{Book, BookRow},
        borrow::{BorrowRecord, BorrowRecordRow, NewBorrowRecord},
        user::{User, UserRow},
    },
};

/// Opens ledger transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>>;
}

/// One serializable unit of ledger work
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerTx: Send {
    /// Read and lock a user row
    async fn user_for_update(&mut self, id: i32) -> AppResult<Option<User>>;

    /// Read and lock a book row
    async fn book_for_update(&mut self, id: i32) -> AppResult<Option<Book>>;

    /// Read a user row without locking it
    async fn find_user(&mut self, id: i32) -> AppResult<Option<User>>;

    /// Read a book row without locking it
    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>>;

    /// Read and lock a borrow record
    async fn record_for_update(&mut self, id: i32) -> AppResult<Option<BorrowRecord>>;

    /// Whether the user holds an unreturned copy of the book
    async fn has_open_borrow(&mut self, user_id: i32, book_id: i32) -> AppResult<bool>;

    /// Insert a new open record.
    ///
    /// Fails with [`LedgerViolation::AlreadyBorrowed`] when the store already
    /// holds an open record for the same user and book.
    async fn insert_record(&mut self, record: &NewBorrowRecord) -> AppResult<BorrowRecord>;

    async fn update_record(&mut self, record: &BorrowRecord) -> AppResult<()>;

    /// Persist stock counters and status of a book
    async fn update_book_stock(&mut self, book: &Book) -> AppResult<()>;

    /// Persist the borrow counter of a user
    async fn update_user_borrow_count(&mut self, user: &User) -> AppResult<()>;

    async fn commit(&mut self) -> AppResult<()>;

    async fn rollback(&mut self) -> AppResult<()>;
}

/// PostgreSQL ledger store
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: Pool<Postgres>,
}

impl PgLedgerStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx: Some(tx) }))
    }
}

pub struct PgLedgerTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerTx {
    fn conn(&mut self) -> AppResult<&mut PgConnection> {
        self.tx
            .as_mut()
            .map(|tx| &mut **tx)
            .ok_or_else(|| AppError::Internal("Ledger transaction already finished".to_string()))
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn user_for_update(&mut self, id: i32) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE id = $1 FOR NO KEY UPDATE",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn book_for_update(&mut self, id: i32) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>(
            "SELECT * FROM books WHERE id = $1 FOR NO KEY UPDATE",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.map(Book::try_from).transpose()
    }

    async fn find_user(&mut self, id: i32) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?;
        row.map(Book::try_from).transpose()
    }

    async fn record_for_update(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        let row = sqlx::query_as::<_, BorrowRecordRow>(
            "SELECT * FROM borrow_records WHERE id = $1 FOR NO KEY UPDATE",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;
        row.map(BorrowRecord::try_from).transpose()
    }

    async fn has_open_borrow(&mut self, user_id: i32, book_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrow_records
                WHERE user_id = $1 AND book_id = $2 AND status = 'borrowed'
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(exists)
    }

    async fn insert_record(&mut self, record: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        let row = sqlx::query_as::<_, BorrowRecordRow>(
            r#"
            INSERT INTO borrow_records (
                user_id, book_id, borrow_date, due_date, status,
                renew_count, max_renew_count, overdue_days, fine_amount,
                operator_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'borrowed', 0, $5, 0, 0, $6, $3, $3)
            RETURNING *
            "#,
        )
        .bind(record.user_id)
        .bind(record.book_id)
        .bind(record.borrow_date)
        .bind(record.due_date)
        .bind(record.max_renew_count)
        .bind(record.operator_id)
        .fetch_one(self.conn()?)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::InvalidState(LedgerViolation::AlreadyBorrowed)
            }
            other => AppError::Database(other),
        })?;
        BorrowRecord::try_from(row)
    }

    async fn update_record(&mut self, record: &BorrowRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE borrow_records SET
                due_date = $2, return_date = $3, status = $4, renew_count = $5,
                overdue_days = $6, fine_amount = $7, operator_id = $8, remark = $9,
                updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.due_date)
        .bind(record.return_date)
        .bind(record.status.as_str())
        .bind(record.renew_count)
        .bind(record.overdue_days)
        .bind(record.fine_amount)
        .bind(record.operator_id)
        .bind(&record.remark)
        .bind(record.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn update_book_stock(&mut self, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE books SET
                total_stock = $2, available_stock = $3, borrow_count = $4, status = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(book.id)
        .bind(book.total_stock)
        .bind(book.available_stock)
        .bind(book.borrow_count)
        .bind(book.status.as_str())
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn update_user_borrow_count(&mut self, user: &User) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET current_borrow_count = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(user.id)
        .bind(user.current_borrow_count)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> AppResult<()> {
        match self.tx.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(AppError::Internal("Ledger transaction already finished".to_string())),
        }
    }

    async fn rollback(&mut self) -> AppResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
