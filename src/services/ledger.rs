//! Borrow ledger: borrow, return, renew and loss of book copies.
//!
//! Each operation runs in one ledger transaction. All preconditions are
//! checked before the first write, and any error rolls the whole unit back,
//! so a failed operation leaves users, books and records untouched. Book
//! cache entries are invalidated only after commit; a cache failure never
//! undoes a committed change.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use validator::Validate;

use super::cache::{book_key, Cache};
use crate::{
    config::LedgerConfig,
    error::{AppError, AppResult, LedgerViolation},
    models::{
        book::Book,
        borrow::{
            BorrowRecord, BorrowRecordDetails, BorrowRequest, LostRequest, NewBorrowRecord,
            RenewRequest, ReturnRequest,
        },
        user::{User, UserStatus},
    },
    repository::{LedgerStore, LedgerTx},
};

/// Outcome of a ledger operation inside its transaction
struct Settled {
    record: BorrowRecord,
    user: Option<User>,
    book: Option<Book>,
    /// Book whose cached representation is stale after commit
    touched_book: Option<i32>,
}

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    cache: Arc<dyn Cache>,
    config: LedgerConfig,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<dyn Cache>, config: LedgerConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Lend one copy of a book to a user
    pub async fn borrow(
        &self,
        request: BorrowRequest,
        operator_id: i32,
    ) -> AppResult<BorrowRecordDetails> {
        self.borrow_at(request, operator_id, Utc::now()).await
    }

    pub async fn borrow_at(
        &self,
        request: BorrowRequest,
        operator_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecordDetails> {
        request.validate()?;
        let due_days = request.due_days.unwrap_or(self.config.default_due_days);

        let mut tx = self.store.begin().await?;
        let outcome = open_loan(
            tx.as_mut(),
            &request,
            due_days,
            self.config.max_renew_count,
            operator_id,
            now,
        )
        .await;
        let settled = finish(tx, outcome).await?;

        tracing::info!(
            record_id = settled.record.id,
            user_id = settled.record.user_id,
            book_id = settled.record.book_id,
            due_date = %settled.record.due_date,
            operator_id,
            "Book borrowed"
        );
        Ok(self.after_commit(settled, now).await)
    }

    /// Close a loan because the copy came back
    pub async fn return_book(
        &self,
        request: ReturnRequest,
        operator_id: i32,
    ) -> AppResult<BorrowRecordDetails> {
        self.return_book_at(request, operator_id, Utc::now()).await
    }

    pub async fn return_book_at(
        &self,
        request: ReturnRequest,
        operator_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecordDetails> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = close_returned(
            tx.as_mut(),
            request,
            self.config.fine_per_day,
            operator_id,
            now,
        )
        .await;
        let settled = finish(tx, outcome).await?;

        tracing::info!(
            record_id = settled.record.id,
            status = %settled.record.status,
            overdue_days = settled.record.overdue_days,
            fine_amount = %settled.record.fine_amount,
            operator_id,
            "Book returned"
        );
        Ok(self.after_commit(settled, now).await)
    }

    /// Push the due date of an open loan back
    pub async fn renew(&self, request: RenewRequest) -> AppResult<BorrowRecordDetails> {
        self.renew_at(request, Utc::now()).await
    }

    pub async fn renew_at(
        &self,
        request: RenewRequest,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecordDetails> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = extend_loan(tx.as_mut(), request.record_id, self.config.renew_days, now).await;
        let settled = finish(tx, outcome).await?;

        tracing::info!(
            record_id = settled.record.id,
            renew_count = settled.record.renew_count,
            due_date = %settled.record.due_date,
            "Loan renewed"
        );
        Ok(self.after_commit(settled, now).await)
    }

    /// Close a loan because the copy will not come back
    pub async fn mark_lost(
        &self,
        request: LostRequest,
        operator_id: i32,
    ) -> AppResult<BorrowRecordDetails> {
        self.mark_lost_at(request, operator_id, Utc::now()).await
    }

    pub async fn mark_lost_at(
        &self,
        request: LostRequest,
        operator_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecordDetails> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let outcome = close_lost(
            tx.as_mut(),
            request,
            self.config.fine_per_day,
            operator_id,
            now,
        )
        .await;
        let settled = finish(tx, outcome).await?;

        tracing::info!(
            record_id = settled.record.id,
            book_id = settled.record.book_id,
            fine_amount = %settled.record.fine_amount,
            operator_id,
            "Book declared lost"
        );
        Ok(self.after_commit(settled, now).await)
    }

    async fn after_commit(&self, settled: Settled, now: DateTime<Utc>) -> BorrowRecordDetails {
        if let Some(book_id) = settled.touched_book {
            self.invalidate_book(book_id).await;
        }
        BorrowRecordDetails::new(
            settled.record,
            settled.user.as_ref(),
            settled.book.as_ref(),
            now,
        )
    }

    async fn invalidate_book(&self, book_id: i32) {
        if let Err(e) = self.cache.delete(&book_key(book_id)).await {
            tracing::warn!(book_id, error = %e, "Failed to invalidate cached book");
        }
    }
}

/// Commit on success, roll back on failure
async fn finish<T>(mut tx: Box<dyn LedgerTx>, outcome: AppResult<T>) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Ledger rollback failed");
            }
            Err(e)
        }
    }
}

async fn open_loan(
    tx: &mut dyn LedgerTx,
    request: &BorrowRequest,
    due_days: u32,
    max_renew_count: i32,
    operator_id: i32,
    now: DateTime<Utc>,
) -> AppResult<Settled> {
    let mut user = tx
        .user_for_update(request.user_id)
        .await?
        .ok_or_else(|| AppError::user_not_found(request.user_id))?;
    if user.status != UserStatus::Active {
        return Err(LedgerViolation::UserNotActive {
            status: user.status,
        }
        .into());
    }
    if !user.can_borrow() {
        return Err(LedgerViolation::BorrowLimitReached {
            current: user.current_borrow_count,
            max: user.max_borrow_count,
        }
        .into());
    }

    let mut book = tx
        .book_for_update(request.book_id)
        .await?
        .ok_or_else(|| AppError::book_not_found(request.book_id))?;
    if !book.is_active {
        return Err(LedgerViolation::BookInactive.into());
    }
    if !book.is_available() {
        return Err(LedgerViolation::BookUnavailable {
            status: book.status,
            available_stock: book.available_stock,
        }
        .into());
    }

    if tx.has_open_borrow(user.id, book.id).await? {
        return Err(LedgerViolation::AlreadyBorrowed.into());
    }

    book.check_out()?;
    user.open_loan();

    let record = tx
        .insert_record(&NewBorrowRecord {
            user_id: user.id,
            book_id: book.id,
            borrow_date: now,
            due_date: now + Duration::days(i64::from(due_days)),
            max_renew_count,
            operator_id,
        })
        .await?;
    tx.update_book_stock(&book).await?;
    tx.update_user_borrow_count(&user).await?;

    Ok(Settled {
        record,
        touched_book: Some(book.id),
        user: Some(user),
        book: Some(book),
    })
}

async fn close_returned(
    tx: &mut dyn LedgerTx,
    request: ReturnRequest,
    fine_per_day: Decimal,
    operator_id: i32,
    now: DateTime<Utc>,
) -> AppResult<Settled> {
    let mut record = tx
        .record_for_update(request.record_id)
        .await?
        .ok_or_else(|| AppError::record_not_found(request.record_id))?;
    record.close_returned(now, fine_per_day, operator_id, request.remark)?;
    tx.update_record(&record).await?;

    let mut user = tx.user_for_update(record.user_id).await?;
    if let Some(user) = user.as_mut() {
        user.close_loan();
        tx.update_user_borrow_count(user).await?;
    }

    // Copies of a deleted or withdrawn book do not go back on the shelf
    let mut book = tx.book_for_update(record.book_id).await?;
    let mut touched_book = None;
    if let Some(book) = book.as_mut().filter(|b| b.is_active) {
        book.check_in();
        tx.update_book_stock(book).await?;
        touched_book = Some(book.id);
    }

    Ok(Settled {
        record,
        user,
        book,
        touched_book,
    })
}

async fn extend_loan(
    tx: &mut dyn LedgerTx,
    record_id: i32,
    renew_days: u32,
    now: DateTime<Utc>,
) -> AppResult<Settled> {
    let mut record = tx
        .record_for_update(record_id)
        .await?
        .ok_or_else(|| AppError::record_not_found(record_id))?;
    record.renew(now, renew_days)?;
    tx.update_record(&record).await?;

    // Display fields only; renewal changes neither row
    let user = tx.find_user(record.user_id).await?;
    let book = tx.find_book(record.book_id).await?;

    Ok(Settled {
        record,
        user,
        book,
        touched_book: None,
    })
}

async fn close_lost(
    tx: &mut dyn LedgerTx,
    request: LostRequest,
    fine_per_day: Decimal,
    operator_id: i32,
    now: DateTime<Utc>,
) -> AppResult<Settled> {
    let mut record = tx
        .record_for_update(request.record_id)
        .await?
        .ok_or_else(|| AppError::record_not_found(request.record_id))?;
    let mut user = tx.user_for_update(record.user_id).await?;
    let mut book = tx.book_for_update(record.book_id).await?;

    let replacement_cost = book.as_ref().map(|b| b.price).unwrap_or(Decimal::ZERO);
    record.close_lost(now, replacement_cost, fine_per_day, operator_id, request.remark)?;
    tx.update_record(&record).await?;

    if let Some(user) = user.as_mut() {
        user.close_loan();
        tx.update_user_borrow_count(user).await?;
    }

    let mut touched_book = None;
    if let Some(book) = book.as_mut() {
        book.write_off_loaned_copy();
        tx.update_book_stock(book).await?;
        touched_book = Some(book.id);
    }

    Ok(Settled {
        record,
        user,
        book,
        touched_book,
    })
}
