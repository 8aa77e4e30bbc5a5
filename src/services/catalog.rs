//! Catalog management service

use std::sync::Arc;

use validator::Validate;

use super::cache::{book_key, Cache};
use crate::{
    error::{AppError, AppResult},
    models::book::{AdjustStock, Book, BookQuery, CreateBook, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    cache: Arc<dyn Cache>,
    book_ttl_seconds: u64,
}

impl CatalogService {
    pub fn new(repository: Repository, cache: Arc<dyn Cache>, book_ttl_seconds: u64) -> Self {
        Self {
            repository,
            cache,
            book_ttl_seconds,
        }
    }

    /// Search books with filters
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        self.repository.books.search(query).await
    }

    /// Get a book, served from the cache when possible
    pub async fn get_book(&self, id: i32) -> AppResult<Book> {
        let key = book_key(id);

        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<Book>(&cached) {
                Ok(book) => return Ok(book),
                Err(e) => tracing::warn!(book_id = id, error = %e, "Discarding unreadable cached book"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(book_id = id, error = %e, "Book cache read failed"),
        }

        let book = self.repository.books.get_by_id(id).await?;

        match serde_json::to_string(&book) {
            Ok(json) => {
                if let Err(e) = self.cache.set(&key, &json, self.book_ttl_seconds).await {
                    tracing::warn!(book_id = id, error = %e, "Book cache write failed");
                }
            }
            Err(e) => tracing::warn!(book_id = id, error = %e, "Failed to serialize book for cache"),
        }

        Ok(book)
    }

    /// Catalogue a new book
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;

        if self.repository.books.isbn_exists(book.isbn.trim()).await? {
            return Err(AppError::Conflict("Book with this ISBN already exists".to_string()));
        }
        if let Some(category_id) = book.category_id {
            self.require_category(category_id).await?;
        }

        let created = self.repository.books.create(&book).await?;
        tracing::info!(book_id = created.id, isbn = %created.isbn, "Book created");
        Ok(created)
    }

    /// Update descriptive fields or the status hold of a book
    pub async fn update_book(&self, id: i32, update: UpdateBook) -> AppResult<Book> {
        update.validate()?;
        if let Some(category_id) = update.category_id {
            self.require_category(category_id).await?;
        }
        let book = self.repository.books.update(id, update).await?;
        self.invalidate(id).await;
        tracing::info!(book_id = id, status = %book.status, "Book updated");
        Ok(book)
    }

    /// Inventory correction of the owned copies
    pub async fn adjust_stock(&self, id: i32, adjust: AdjustStock) -> AppResult<Book> {
        adjust.validate()?;
        let book = self.repository.books.set_total_stock(id, adjust.total_stock).await?;
        self.invalidate(id).await;
        tracing::info!(
            book_id = id,
            total_stock = book.total_stock,
            available_stock = book.available_stock,
            "Book stock adjusted"
        );
        Ok(book)
    }

    /// Withdraw a book from the catalog; its records are kept
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        self.repository.books.deactivate(id).await?;
        self.invalidate(id).await;
        tracing::info!(book_id = id, "Book deactivated");
        Ok(())
    }

    /// Books are only filed under active categories
    async fn require_category(&self, category_id: i32) -> AppResult<()> {
        match self.repository.categories.get_by_id(category_id).await {
            Ok(category) if category.is_active => Ok(()),
            Ok(_) => Err(AppError::Validation(format!(
                "Category {} is not active",
                category_id
            ))),
            Err(AppError::NotFound(_)) => Err(AppError::Validation(format!(
                "Category {} does not exist",
                category_id
            ))),
            Err(e) => Err(e),
        }
    }

    async fn invalidate(&self, id: i32) {
        if let Err(e) = self.cache.delete(&book_key(id)).await {
            tracing::warn!(book_id = id, error = %e, "Failed to invalidate cached book");
        }
    }
}
