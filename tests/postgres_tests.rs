//! Ledger and catalog against PostgreSQL.
//!
//! Each test gets a fresh database with the migrations applied; `DATABASE_URL`
//! must point at a server where the test user may create databases.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio_test::{assert_err, assert_ok};

use libris_server::{
    error::{AppError, LedgerViolation},
    models::{
        book::{BookQuery, CreateBook, UpdateBook},
        borrow::{BorrowRequest, NewBorrowRecord, RenewRequest, ReturnRequest},
        category::{CreateCategory, UpdateCategory},
        BookStatus, BorrowStatus,
    },
    repository::{LedgerStore, LedgerTx, PgLedgerStore, Repository},
    services::{
        cache::MemoryCache, catalog::CatalogService, categories::CategoriesService,
        ledger::LedgerService,
    },
};

fn ledger(pool: &PgPool) -> LedgerService {
    LedgerService::new(
        Arc::new(PgLedgerStore::new(pool.clone())),
        Arc::new(MemoryCache::new()),
        common::ledger_config(),
    )
}

async fn seed_user(pool: &PgPool, username: &str, max_borrow_count: i32) -> i32 {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, role, max_borrow_count)
        VALUES ($1, $2, 'user', $3)
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(format!("{}@example.org", username))
    .bind(max_borrow_count)
    .fetch_one(pool)
    .await
    .expect("seed user")
}

async fn seed_staff(pool: &PgPool) -> i32 {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, role)
        VALUES ('desk', 'desk@example.org', 'librarian')
        RETURNING id
        "#,
    )
    .fetch_one(pool)
    .await
    .expect("seed staff")
}

async fn seed_book(pool: &PgPool, isbn: &str, copies: i32) -> i32 {
    sqlx::query_scalar(
        r#"
        INSERT INTO books (isbn, title, author, price, total_stock, available_stock)
        VALUES ($1, 'The Dispossessed', 'Ursula K. Le Guin', 18.00, $2, $2)
        RETURNING id
        "#,
    )
    .bind(isbn)
    .bind(copies)
    .fetch_one(pool)
    .await
    .expect("seed book")
}

async fn open_loans(pool: &PgPool, book_id: i32) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM borrow_records WHERE book_id = $1 AND status = 'borrowed'",
    )
    .bind(book_id)
    .fetch_one(pool)
    .await
    .expect("count loans")
}

fn borrow(user_id: i32, book_id: i32) -> BorrowRequest {
    BorrowRequest {
        user_id,
        book_id,
        due_days: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn borrow_renew_and_return_round_trip(pool: PgPool) {
    let ledger = ledger(&pool);
    let staff = seed_staff(&pool).await;
    let repository = Repository::new(pool.clone());
    let reader = seed_user(&pool, "ada", 5).await;
    let book = seed_book(&pool, "9780061054884", 2).await;

    let now = Utc::now();
    let borrowed = assert_ok!(ledger.borrow_at(borrow(reader, book), staff, now).await);
    assert_eq!(borrowed.record.status, BorrowStatus::Borrowed);
    assert_eq!(repository.books.get_by_id(book).await.unwrap().available_stock, 1);
    assert_eq!(repository.users.get_by_id(reader).await.unwrap().current_borrow_count, 1);

    let renewed = assert_ok!(
        ledger
            .renew_at(RenewRequest { record_id: borrowed.record.id }, now)
            .await
    );
    assert_eq!(renewed.record.due_date, borrowed.record.due_date + Duration::days(14));

    let returned = assert_ok!(
        ledger
            .return_book_at(
                ReturnRequest {
                    record_id: borrowed.record.id,
                    remark: None,
                },
                staff,
                now + Duration::days(50),
            )
            .await
    );
    assert_eq!(returned.record.status, BorrowStatus::Overdue);
    assert_eq!(returned.record.overdue_days, 6);

    let stored = repository.books.get_by_id(book).await.unwrap();
    assert_eq!((stored.available_stock, stored.borrow_count), (2, 1));
    assert_eq!(stored.status, BookStatus::Available);
    assert_eq!(repository.users.get_by_id(reader).await.unwrap().current_borrow_count, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn empty_shelf_refuses_and_changes_nothing(pool: PgPool) {
    let ledger = ledger(&pool);
    let staff = seed_staff(&pool).await;
    let repository = Repository::new(pool.clone());
    let first = seed_user(&pool, "ada", 5).await;
    let second = seed_user(&pool, "grace", 5).await;
    let book = seed_book(&pool, "9780061054885", 1).await;

    assert_ok!(ledger.borrow(borrow(first, book), staff).await);
    let err = assert_err!(ledger.borrow(borrow(second, book), staff).await);

    assert!(matches!(
        err,
        AppError::InvalidState(LedgerViolation::BookUnavailable { available_stock: 0, .. })
    ));
    let stored = repository.books.get_by_id(book).await.unwrap();
    assert_eq!(stored.available_stock, 0);
    assert_eq!(stored.status, BookStatus::Borrowed);
    assert_eq!(repository.users.get_by_id(second).await.unwrap().current_borrow_count, 0);
    assert_eq!(open_loans(&pool, book).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_borrows_of_the_last_copy(pool: PgPool) {
    let ledger = ledger(&pool);
    let staff = seed_staff(&pool).await;
    let book = seed_book(&pool, "9780061054886", 1).await;
    let mut readers = Vec::new();
    for name in ["ada", "grace", "barbara", "radia"] {
        readers.push(seed_user(&pool, name, 5).await);
    }

    let handles: Vec<_> = readers
        .into_iter()
        .map(|reader| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.borrow(borrow(reader, book), staff).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::InvalidState(LedgerViolation::BookUnavailable { .. })) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(open_loans(&pool, book).await, 1);
    let available: i32 = sqlx::query_scalar("SELECT available_stock FROM books WHERE id = $1")
        .bind(book)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(available, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_borrows_by_the_same_reader(pool: PgPool) {
    let ledger = ledger(&pool);
    let staff = seed_staff(&pool).await;
    let repository = Repository::new(pool.clone());
    let reader = seed_user(&pool, "ada", 5).await;
    let book = seed_book(&pool, "9780061054887", 3).await;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.borrow(borrow(reader, book), staff).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::InvalidState(LedgerViolation::AlreadyBorrowed)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(open_loans(&pool, book).await, 1);
    assert_eq!(repository.books.get_by_id(book).await.unwrap().available_stock, 2);
    assert_eq!(repository.users.get_by_id(reader).await.unwrap().current_borrow_count, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn second_open_record_for_a_pair_is_rejected_by_the_index(pool: PgPool) {
    let store = PgLedgerStore::new(pool.clone());
    let reader = seed_user(&pool, "ada", 5).await;
    let book = seed_book(&pool, "9780061054888", 2).await;
    let now = Utc::now();
    let record = NewBorrowRecord {
        user_id: reader,
        book_id: book,
        borrow_date: now,
        due_date: now + Duration::days(30),
        max_renew_count: 2,
        operator_id: reader,
    };

    let mut tx = store.begin().await.unwrap();
    assert_ok!(tx.insert_record(&record).await);
    let err = assert_err!(tx.insert_record(&record).await);
    assert!(matches!(
        err,
        AppError::InvalidState(LedgerViolation::AlreadyBorrowed)
    ));
    tx.rollback().await.unwrap();

    assert_eq!(open_loans(&pool, book).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn locked_operator_row_does_not_block_a_borrow(pool: PgPool) {
    let ledger = ledger(&pool);
    let store = PgLedgerStore::new(pool.clone());
    let staff = seed_staff(&pool).await;
    let reader = seed_user(&pool, "ada", 5).await;
    let book = seed_book(&pool, "9780061054889", 1).await;

    // Another ledger transaction holds the staff member's user row
    let mut holder = store.begin().await.unwrap();
    assert!(holder.user_for_update(staff).await.unwrap().is_some());

    let outcome = tokio::time::timeout(
        StdDuration::from_secs(5),
        ledger.borrow(borrow(reader, book), staff),
    )
    .await
    .expect("borrow waited on the operator row lock");
    let details = assert_ok!(outcome);
    assert_eq!(details.record.operator_id, Some(staff));

    holder.rollback().await.unwrap();
}

fn catalog(repository: &Repository) -> (CatalogService, CategoriesService) {
    (
        CatalogService::new(repository.clone(), Arc::new(MemoryCache::new()), 60),
        CategoriesService::new(repository.clone()),
    )
}

fn new_category(name: &str, parent_id: Option<i32>) -> CreateCategory {
    CreateCategory {
        name: name.to_string(),
        description: None,
        parent_id,
        sort_order: None,
    }
}

fn new_book(isbn: &str, title: &str, category_id: Option<i32>) -> CreateBook {
    CreateBook {
        isbn: isbn.to_string(),
        title: title.to_string(),
        author: "Jorge Luis Borges".to_string(),
        publisher: None,
        publish_date: Some("1944".to_string()),
        price: None,
        category_id,
        summary: None,
        cover_url: None,
        total_stock: Some(1),
        location: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn books_can_be_filtered_by_category(pool: PgPool) {
    let repository = Repository::new(pool);
    let (books, categories) = catalog(&repository);
    let fiction = categories.create_category(new_category("Fiction", None)).await.unwrap();
    let essays = categories.create_category(new_category("Essays", None)).await.unwrap();

    let ficciones = books
        .create_book(new_book("9780802130303", "Ficciones", Some(fiction.id)))
        .await
        .unwrap();
    books
        .create_book(new_book("9780811200127", "Other Inquisitions", Some(essays.id)))
        .await
        .unwrap();
    books
        .create_book(new_book("9780811216999", "Labyrinths", None))
        .await
        .unwrap();

    let query = BookQuery {
        category_id: Some(fiction.id),
        ..Default::default()
    };
    let (found, total) = books.search_books(&query).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(found[0].id, ficciones.id);
    assert_eq!(found[0].publish_date.as_deref(), Some("1944"));
}

#[sqlx::test(migrations = "./migrations")]
async fn books_cannot_be_filed_under_unknown_categories(pool: PgPool) {
    let repository = Repository::new(pool);
    let (books, _) = catalog(&repository);

    let err = assert_err!(
        books
            .create_book(new_book("9780802130303", "Ficciones", Some(404)))
            .await
    );
    assert!(matches!(err, AppError::Validation(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn occupied_category_cannot_be_deleted(pool: PgPool) {
    let repository = Repository::new(pool);
    let (books, categories) = catalog(&repository);
    let fiction = categories.create_category(new_category("Fiction", None)).await.unwrap();
    let stories = categories
        .create_category(new_category("Short stories", Some(fiction.id)))
        .await
        .unwrap();
    let book = books
        .create_book(new_book("9780802130303", "Ficciones", Some(stories.id)))
        .await
        .unwrap();

    let err = assert_err!(categories.delete_category(fiction.id).await);
    assert!(matches!(err, AppError::Conflict(_)));
    let err = assert_err!(categories.delete_category(stories.id).await);
    assert!(matches!(err, AppError::Conflict(_)));

    books
        .update_book(
            book.id,
            UpdateBook {
                uncategorize: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_ok!(categories.delete_category(stories.id).await);
    assert_ok!(categories.delete_category(fiction.id).await);
    assert!(!categories.get_category(fiction.id).await.unwrap().is_active);
}

#[sqlx::test(migrations = "./migrations")]
async fn category_tree_stays_acyclic(pool: PgPool) {
    let repository = Repository::new(pool);
    let (_, categories) = catalog(&repository);
    let root = categories.create_category(new_category("Fiction", None)).await.unwrap();
    let child = categories
        .create_category(new_category("Fantasy", Some(root.id)))
        .await
        .unwrap();
    let grandchild = categories
        .create_category(new_category("Sword and sorcery", Some(child.id)))
        .await
        .unwrap();

    let err = assert_err!(
        categories
            .update_category(
                root.id,
                UpdateCategory {
                    parent_id: Some(grandchild.id),
                    ..Default::default()
                },
            )
            .await
    );
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(categories.get_category(root.id).await.unwrap().parent_id, None);

    let err = assert_err!(
        categories
            .create_category(new_category("Fantasy", None))
            .await
    );
    assert!(matches!(err, AppError::Conflict(_)));
}
