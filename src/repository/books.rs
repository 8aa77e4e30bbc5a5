//! Books repository for database operations

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, BookRow, CreateBook, UpdateBook},
        Page,
    },
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
    builder.push(" WHERE 1=1");
    if let Some(ref keyword) = query.keyword {
        let pattern = format!("%{}%", keyword.trim());
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR author ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR isbn ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(ref author) = query.author {
        builder
            .push(" AND author ILIKE ")
            .push_bind(format!("%{}%", author.trim()));
    }
    if let Some(category_id) = query.category_id {
        builder.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(is_active) = query.is_active {
        builder.push(" AND is_active = ").push_bind(is_active);
    }
}

/// Read a book under a row lock that still admits foreign-key checks
async fn lock_book(tx: &mut Transaction<'_, Postgres>, id: i32) -> AppResult<Book> {
    sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = $1 FOR NO KEY UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::book_not_found(id))?
        .try_into()
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::book_not_found(id))?
            .try_into()
    }

    /// Check if an ISBN is already catalogued
    pub async fn isbn_exists(&self, isbn: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE isbn = $1)")
            .bind(isbn)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Search books with filters and pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let page = Page::new(query.page, query.per_page);

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM books");
        push_filters(&mut count_builder, query);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select_builder = QueryBuilder::<Postgres>::new("SELECT * FROM books");
        push_filters(&mut select_builder, query);
        select_builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.per_page)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = select_builder
            .build_query_as::<BookRow>()
            .fetch_all(&self.pool)
            .await?;

        let books = rows
            .into_iter()
            .map(Book::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((books, total))
    }

    /// Create a new book; every copy starts on the shelf
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let total_stock = book.total_stock.unwrap_or(1);
        let status = if total_stock > 0 { "available" } else { "borrowed" };

        let row = sqlx::query_as::<_, BookRow>(
            r#"
            INSERT INTO books (
                isbn, title, author, publisher, price,
                total_stock, available_stock, borrow_count, status, location, is_active,
                category_id, publish_date, summary, cover_url
            )
            VALUES ($1, $2, $3, $4, COALESCE($5, 0), $6, $6, 0, $7, $8, TRUE, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(book.isbn.trim())
        .bind(book.title.trim())
        .bind(book.author.trim())
        .bind(&book.publisher)
        .bind(book.price)
        .bind(total_stock)
        .bind(status)
        .bind(&book.location)
        .bind(book.category_id)
        .bind(&book.publish_date)
        .bind(&book.summary)
        .bind(&book.cover_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("Book with this ISBN already exists".to_string())
            }
            other => AppError::Database(other),
        })?;

        row.try_into()
    }

    /// Apply a partial update under a row lock
    pub async fn update(&self, id: i32, update: UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let mut book = lock_book(&mut tx, id).await?;
        book.apply_update(update)?;

        let row = sqlx::query_as::<_, BookRow>(
            r#"
            UPDATE books SET
                title = $2, author = $3, publisher = $4, price = $5, location = $6,
                status = $7, category_id = $8, publish_date = $9, summary = $10,
                cover_url = $11, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.publisher)
        .bind(book.price)
        .bind(&book.location)
        .bind(book.status.as_str())
        .bind(book.category_id)
        .bind(&book.publish_date)
        .bind(&book.summary)
        .bind(&book.cover_url)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Inventory correction of the owned copies
    pub async fn set_total_stock(&self, id: i32, total_stock: i32) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        let mut book = lock_book(&mut tx, id).await?;
        book.set_total_stock(total_stock)?;

        let row = sqlx::query_as::<_, BookRow>(
            r#"
            UPDATE books SET
                total_stock = $2, available_stock = $3, status = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(book.total_stock)
        .bind(book.available_stock)
        .bind(book.status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Whether any catalogued book is filed under the category
    pub async fn category_in_use(&self, category_id: i32) -> AppResult<bool> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE category_id = $1 AND is_active)",
        )
        .bind(category_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(in_use)
    }

    /// Soft-delete a book
    pub async fn deactivate(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("UPDATE books SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::book_not_found(id));
        }
        Ok(())
    }
}
