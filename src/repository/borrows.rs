//! Borrow record queries.
//!
//! Mutations of borrow records go through the ledger store; this repository
//! only reads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::PopularBook,
        borrow::{BorrowQuery, BorrowRecordDetails, BorrowRecordDetailsRow, BorrowStatistics},
        user::ActiveUser,
        Page,
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT r.*,
           COALESCE(u.full_name, u.username) AS user_name,
           b.title AS book_title,
           b.isbn AS book_isbn
    FROM borrow_records r
    LEFT JOIN users u ON u.id = r.user_id
    LEFT JOIN books b ON b.id = r.book_id
"#;

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    query: &BorrowQuery,
    only_user: Option<i32>,
) {
    builder.push(" WHERE 1=1");
    if let Some(user_id) = only_user.or(query.user_id) {
        builder.push(" AND r.user_id = ").push_bind(user_id);
    }
    if let Some(book_id) = query.book_id {
        builder.push(" AND r.book_id = ").push_bind(book_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND r.status = ").push_bind(status.as_str());
    }
    if let Some(start) = query.start_date {
        builder.push(" AND r.borrow_date >= ").push_bind(start);
    }
    if let Some(end) = query.end_date {
        builder.push(" AND r.borrow_date <= ").push_bind(end);
    }
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get one record with display fields
    pub async fn get_details(&self, id: i32) -> AppResult<BorrowRecordDetails> {
        let mut builder = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        builder.push(" WHERE r.id = ").push_bind(id);

        builder
            .build_query_as::<BorrowRecordDetailsRow>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::record_not_found(id))?
            .into_details(Utc::now())
    }

    /// Search records, newest first.
    ///
    /// `only_user` overrides any user filter in the query.
    pub async fn search(
        &self,
        query: &BorrowQuery,
        only_user: Option<i32>,
    ) -> AppResult<(Vec<BorrowRecordDetails>, i64)> {
        let page = Page::new(query.page, query.per_page);

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM borrow_records r");
        push_filters(&mut count_builder, query, only_user);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select_builder = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        push_filters(&mut select_builder, query, only_user);
        select_builder
            .push(" ORDER BY r.created_at DESC, r.id DESC LIMIT ")
            .push_bind(page.per_page)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let now = Utc::now();
        let records = select_builder
            .build_query_as::<BorrowRecordDetailsRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.into_details(now))
            .collect::<AppResult<Vec<_>>>()?;

        Ok((records, total))
    }

    /// Records closed late, plus open records already past their due date
    pub async fn overdue(
        &self,
        now: DateTime<Utc>,
        page: Page,
    ) -> AppResult<(Vec<BorrowRecordDetails>, i64)> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM borrow_records r
            WHERE r.status = 'overdue' OR (r.status = 'borrowed' AND r.due_date < $1)
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let mut builder = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        builder
            .push(" WHERE r.status = 'overdue' OR (r.status = 'borrowed' AND r.due_date < ")
            .push_bind(now)
            .push(") ORDER BY r.due_date, r.id LIMIT ")
            .push_bind(page.per_page)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let records = builder
            .build_query_as::<BorrowRecordDetailsRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.into_details(now))
            .collect::<AppResult<Vec<_>>>()?;

        Ok((records, total))
    }

    /// Ledger-wide counters and rankings
    pub async fn statistics(&self) -> AppResult<BorrowStatistics> {
        let (borrowed_count, returned_count, overdue_count, lost_count, total_fine_amount): (
            i64,
            i64,
            i64,
            i64,
            Decimal,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'borrowed'),
                COUNT(*) FILTER (WHERE status = 'returned'),
                COUNT(*) FILTER (WHERE status = 'overdue'),
                COUNT(*) FILTER (WHERE status = 'lost'),
                COALESCE(SUM(fine_amount), 0)
            FROM borrow_records
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let popular_books = sqlx::query_as::<_, PopularBook>(
            "SELECT id, title, borrow_count FROM books ORDER BY borrow_count DESC, id LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await?;

        let active_users = sqlx::query_as::<_, ActiveUser>(
            r#"
            SELECT id, username, current_borrow_count AS borrow_count
            FROM users
            ORDER BY current_borrow_count DESC, id
            LIMIT 10
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(BorrowStatistics {
            borrowed_count,
            returned_count,
            overdue_count,
            lost_count,
            total_fine_amount,
            popular_books,
            active_users,
        })
    }
}
