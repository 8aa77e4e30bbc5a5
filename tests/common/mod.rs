//! Shared fixtures: a ledger over the in-memory store and cache

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use libris_server::{
    config::LedgerConfig,
    models::{Book, BookStatus, User, UserRole, UserStatus},
    repository::MemoryStore,
    services::{cache::MemoryCache, ledger::LedgerService},
};

pub const STAFF_ID: i32 = 99;

pub fn ledger_config() -> LedgerConfig {
    LedgerConfig {
        default_due_days: 30,
        renew_days: 14,
        max_renew_count: 2,
        fine_per_day: Decimal::new(50, 2),
    }
}

pub fn reader(id: i32, max_borrow_count: i32) -> User {
    let now = Utc::now();
    User {
        id,
        username: format!("reader{}", id),
        email: format!("reader{}@example.org", id),
        full_name: None,
        role: UserRole::User,
        status: UserStatus::Active,
        max_borrow_count,
        current_borrow_count: 0,
        created_at: now,
        updated_at: now,
    }
}

pub fn book(id: i32, copies: i32) -> Book {
    let now = Utc::now();
    let mut book = Book {
        id,
        isbn: format!("97801{:08}", id),
        title: format!("Volume {}", id),
        author: "Italo Calvino".into(),
        publisher: Some("Einaudi".into()),
        publish_date: Some("1979".into()),
        price: Decimal::new(2400, 2),
        category_id: None,
        summary: None,
        cover_url: None,
        total_stock: copies,
        available_stock: copies,
        borrow_count: 0,
        status: BookStatus::Available,
        location: Some("A-3".into()),
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    book.sync_status();
    book
}

pub struct Harness {
    pub ledger: LedgerService,
    pub store: MemoryStore,
    pub cache: Arc<MemoryCache>,
}

/// Readers 1 and 2 (limit 5), book 10 with two copies, book 11 with one copy
pub async fn harness() -> Harness {
    let store = MemoryStore::new();
    store.put_user(reader(1, 5)).await;
    store.put_user(reader(2, 5)).await;
    store.put_book(book(10, 2)).await;
    store.put_book(book(11, 1)).await;

    let cache = Arc::new(MemoryCache::new());
    let ledger = LedgerService::new(Arc::new(store.clone()), cache.clone(), ledger_config());

    Harness {
        ledger,
        store,
        cache,
    }
}

impl Harness {
    /// Stock and borrower counters stay within their bounds
    pub async fn assert_counters_in_range(&self) {
        for id in [10, 11] {
            let book = self.store.book(id).await.expect("book fixture");
            assert!(book.available_stock >= 0, "negative stock on book {}", id);
            assert!(
                book.available_stock <= book.total_stock,
                "stock above total on book {}",
                id
            );
        }
        for id in [1, 2] {
            let user = self.store.user(id).await.expect("user fixture");
            assert!(user.current_borrow_count >= 0);
            assert!(user.current_borrow_count <= user.max_borrow_count);
        }
    }
}
