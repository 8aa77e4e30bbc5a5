//! Users repository for database operations

use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        user::{CreateUser, UpdateUser, User, UserQuery, UserRole, UserRow},
        Page,
    },
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
    builder.push(" WHERE 1=1");
    if let Some(ref keyword) = query.keyword {
        let pattern = format!("%{}%", keyword.trim().to_lowercase());
        builder
            .push(" AND (LOWER(username) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(email) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(full_name, '')) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(role) = query.role {
        builder.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

fn map_duplicate(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Username or email already in use".to_string())
        }
        other => AppError::Database(other),
    }
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::user_not_found(id))?
            .try_into()
    }

    /// Search users with filters and pagination
    pub async fn search(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        let page = Page::new(query.page, query.per_page);

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count_builder, query);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select_builder = QueryBuilder::<Postgres>::new("SELECT * FROM users");
        push_filters(&mut select_builder, query);
        select_builder
            .push(" ORDER BY username LIMIT ")
            .push_bind(page.per_page)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let users = select_builder
            .build_query_as::<UserRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((users, total))
    }

    /// Create a new user
    pub async fn create(&self, user: &CreateUser) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (
                username, email, full_name, role, status, max_borrow_count, current_borrow_count
            )
            VALUES ($1, $2, $3, $4, 'active', $5, 0)
            RETURNING *
            "#,
        )
        .bind(user.username.trim())
        .bind(user.email.trim())
        .bind(&user.full_name)
        .bind(user.role.unwrap_or(UserRole::User).as_str())
        .bind(user.max_borrow_count.unwrap_or(5))
        .fetch_one(&self.pool)
        .await
        .map_err(map_duplicate)?;

        row.try_into()
    }

    /// Apply a partial update under a row lock
    pub async fn update(&self, id: i32, update: UpdateUser) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        let mut user: User =
            sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1 FOR NO KEY UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::user_not_found(id))?
                .try_into()?;

        user.apply_update(update)?;

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            UPDATE users SET
                full_name = $2, email = $3, role = $4, status = $5, max_borrow_count = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(user.max_borrow_count)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_duplicate)?;

        tx.commit().await?;
        row.try_into()
    }
}
