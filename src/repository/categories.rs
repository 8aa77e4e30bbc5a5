//! Categories repository for database operations

use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        category::{Category, CategoryQuery, CreateCategory, UpdateCategory},
        Page,
    },
};

#[derive(Clone)]
pub struct CategoriesRepository {
    pool: Pool<Postgres>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &CategoryQuery) {
    builder.push(" WHERE 1=1");
    if let Some(ref name) = query.name {
        builder
            .push(" AND name ILIKE ")
            .push_bind(format!("%{}%", name.trim()));
    }
    if let Some(parent_id) = query.parent_id {
        builder.push(" AND parent_id = ").push_bind(parent_id);
    }
    if let Some(is_active) = query.is_active {
        builder.push(" AND is_active = ").push_bind(is_active);
    }
}

fn map_duplicate(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Category with this name already exists".to_string())
        }
        other => AppError::Database(other),
    }
}

impl CategoriesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Category> {
        sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::category_not_found(id))
    }

    /// Check if a name is taken by another category
    pub async fn name_exists(&self, name: &str, except_id: Option<i32>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE name = $1 AND id IS DISTINCT FROM $2)",
        )
        .bind(name)
        .bind(except_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Search categories in sibling order
    pub async fn search(&self, query: &CategoryQuery) -> AppResult<(Vec<Category>, i64)> {
        let page = Page::new(query.page, query.per_page);

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM categories");
        push_filters(&mut count_builder, query);
        let total = count_builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select_builder = QueryBuilder::<Postgres>::new("SELECT * FROM categories");
        push_filters(&mut select_builder, query);
        select_builder
            .push(" ORDER BY sort_order, id LIMIT ")
            .push_bind(page.per_page)
            .push(" OFFSET ")
            .push_bind(page.offset());

        let categories = select_builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await?;

        Ok((categories, total))
    }

    /// Every active category, for pickers
    pub async fn list_active(&self) -> AppResult<Vec<Category>> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE is_active ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    pub async fn create(&self, category: &CreateCategory) -> AppResult<Category> {
        sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, description, parent_id, sort_order, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING *
            "#,
        )
        .bind(category.name.trim())
        .bind(&category.description)
        .bind(category.parent_id)
        .bind(category.sort_order.unwrap_or(0))
        .fetch_one(&self.pool)
        .await
        .map_err(map_duplicate)
    }

    /// Apply a partial update under a row lock.
    ///
    /// A new parent must exist and must not sit below the category itself.
    pub async fn update(&self, id: i32, update: UpdateCategory) -> AppResult<Category> {
        let mut tx = self.pool.begin().await?;

        let mut category = sqlx::query_as::<_, Category>(
            "SELECT * FROM categories WHERE id = $1 FOR NO KEY UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::category_not_found(id))?;

        let new_parent = update.parent_id;
        category.apply_update(update)?;

        if let Some(parent_id) = new_parent.filter(|_| category.parent_id.is_some()) {
            // Ancestors of the new parent, the parent included
            let creates_cycle: bool = sqlx::query_scalar(
                r#"
                WITH RECURSIVE ancestors(id, parent_id) AS (
                    SELECT id, parent_id FROM categories WHERE id = $1
                    UNION
                    SELECT c.id, c.parent_id
                    FROM categories c JOIN ancestors a ON c.id = a.parent_id
                )
                SELECT EXISTS(SELECT 1 FROM ancestors WHERE id = $2)
                "#,
            )
            .bind(parent_id)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
            if creates_cycle {
                return Err(AppError::Validation(format!(
                    "Category {} is below category {} and cannot become its parent",
                    parent_id, id
                )));
            }
        }

        let updated = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET
                name = $2, description = $3, parent_id = $4, sort_order = $5,
                is_active = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.parent_id)
        .bind(category.sort_order)
        .bind(category.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_duplicate)?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Whether the category still has active children
    pub async fn has_children(&self, id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE parent_id = $1 AND is_active)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Soft-delete a category
    pub async fn deactivate(&self, id: i32) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE categories SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::category_not_found(id));
        }
        Ok(())
    }
}
