//! In-memory ledger store.
//!
//! A transaction takes the store-wide lock and works on a copy of the tables;
//! commit swaps the copy in, rollback or drop discards it. Transactions are
//! therefore fully serialized. The same storage checks as the SQL schema are
//! enforced on write (stock range, one open loan per user and book).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::ledger::{LedgerStore, LedgerTx};
use crate::{
    error::{AppError, AppResult, LedgerViolation},
    models::{
        book::Book,
        borrow::{BorrowRecord, BorrowStatus, NewBorrowRecord},
        user::User,
    },
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    books: BTreeMap<i32, Book>,
    records: BTreeMap<i32, BorrowRecord>,
    last_record_id: i32,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    pub async fn put_book(&self, book: Book) {
        self.tables.lock().await.books.insert(book.id, book);
    }

    pub async fn user(&self, id: i32) -> Option<User> {
        self.tables.lock().await.users.get(&id).cloned()
    }

    pub async fn book(&self, id: i32) -> Option<Book> {
        self.tables.lock().await.books.get(&id).cloned()
    }

    pub async fn record(&self, id: i32) -> Option<BorrowRecord> {
        self.tables.lock().await.records.get(&id).cloned()
    }

    pub async fn records(&self) -> Vec<BorrowRecord> {
        self.tables.lock().await.records.values().cloned().collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            working,
        }))
    }
}

struct MemoryTx {
    guard: Option<OwnedMutexGuard<Tables>>,
    working: Tables,
}

impl MemoryTx {
    fn ensure_active(&self) -> AppResult<()> {
        if self.guard.is_some() {
            Ok(())
        } else {
            Err(AppError::Internal("Ledger transaction already finished".to_string()))
        }
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn user_for_update(&mut self, id: i32) -> AppResult<Option<User>> {
        self.ensure_active()?;
        Ok(self.working.users.get(&id).cloned())
    }

    async fn book_for_update(&mut self, id: i32) -> AppResult<Option<Book>> {
        self.ensure_active()?;
        Ok(self.working.books.get(&id).cloned())
    }

    async fn find_user(&mut self, id: i32) -> AppResult<Option<User>> {
        self.user_for_update(id).await
    }

    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        self.book_for_update(id).await
    }

    async fn record_for_update(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        self.ensure_active()?;
        Ok(self.working.records.get(&id).cloned())
    }

    async fn has_open_borrow(&mut self, user_id: i32, book_id: i32) -> AppResult<bool> {
        self.ensure_active()?;
        Ok(self.working.records.values().any(|r| {
            r.user_id == user_id && r.book_id == book_id && r.status == BorrowStatus::Borrowed
        }))
    }

    async fn insert_record(&mut self, record: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        if self.has_open_borrow(record.user_id, record.book_id).await? {
            return Err(LedgerViolation::AlreadyBorrowed.into());
        }
        self.working.last_record_id += 1;
        let stored = record.clone().into_record(self.working.last_record_id);
        self.working.records.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_record(&mut self, record: &BorrowRecord) -> AppResult<()> {
        self.ensure_active()?;
        match self.working.records.get_mut(&record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(AppError::record_not_found(record.id)),
        }
    }

    async fn update_book_stock(&mut self, book: &Book) -> AppResult<()> {
        self.ensure_active()?;
        if book.available_stock < 0 || book.available_stock > book.total_stock {
            return Err(AppError::Internal(format!(
                "Stock check failed for book {}: {} of {}",
                book.id, book.available_stock, book.total_stock
            )));
        }
        let stored = self
            .working
            .books
            .get_mut(&book.id)
            .ok_or_else(|| AppError::book_not_found(book.id))?;
        stored.total_stock = book.total_stock;
        stored.available_stock = book.available_stock;
        stored.borrow_count = book.borrow_count;
        stored.status = book.status;
        Ok(())
    }

    async fn update_user_borrow_count(&mut self, user: &User) -> AppResult<()> {
        self.ensure_active()?;
        let stored = self
            .working
            .users
            .get_mut(&user.id)
            .ok_or_else(|| AppError::user_not_found(user.id))?;
        if user.current_borrow_count < 0 || user.current_borrow_count > stored.max_borrow_count {
            return Err(AppError::Internal(format!(
                "Borrow count check failed for user {}: {} of {}",
                user.id, user.current_borrow_count, stored.max_borrow_count
            )));
        }
        stored.current_borrow_count = user.current_borrow_count;
        Ok(())
    }

    async fn commit(&mut self) -> AppResult<()> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| AppError::Internal("Ledger transaction already finished".to_string()))?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> AppResult<()> {
        self.guard = None;
        Ok(())
    }
}
