//! Category tree maintenance

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::category::{Category, CategoryQuery, CreateCategory, UpdateCategory},
    repository::Repository,
};

#[derive(Clone)]
pub struct CategoriesService {
    repository: Repository,
}

impl CategoriesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_category(&self, id: i32) -> AppResult<Category> {
        self.repository.categories.get_by_id(id).await
    }

    pub async fn search_categories(&self, query: &CategoryQuery) -> AppResult<(Vec<Category>, i64)> {
        self.repository.categories.search(query).await
    }

    pub async fn active_categories(&self) -> AppResult<Vec<Category>> {
        self.repository.categories.list_active().await
    }

    pub async fn create_category(&self, category: CreateCategory) -> AppResult<Category> {
        category.validate()?;

        if self.repository.categories.name_exists(category.name.trim(), None).await? {
            return Err(AppError::Conflict("Category with this name already exists".to_string()));
        }
        if let Some(parent_id) = category.parent_id {
            self.require_parent(parent_id).await?;
        }

        let created = self.repository.categories.create(&category).await?;
        tracing::info!(category_id = created.id, name = %created.name, "Category created");
        Ok(created)
    }

    /// Rename, move or reorder a category
    pub async fn update_category(&self, id: i32, update: UpdateCategory) -> AppResult<Category> {
        update.validate()?;

        if let Some(ref name) = update.name {
            if self.repository.categories.name_exists(name.trim(), Some(id)).await? {
                return Err(AppError::Conflict(
                    "Category with this name already exists".to_string(),
                ));
            }
        }
        if let Some(parent_id) = update.parent_id.filter(|&p| p != id) {
            self.require_parent(parent_id).await?;
        }

        let category = self.repository.categories.update(id, update).await?;
        tracing::info!(category_id = id, parent_id = ?category.parent_id, "Category updated");
        Ok(category)
    }

    /// Withdraw an empty category
    pub async fn delete_category(&self, id: i32) -> AppResult<()> {
        self.repository.categories.get_by_id(id).await?;

        if self.repository.categories.has_children(id).await? {
            return Err(AppError::Conflict(format!(
                "Category {} still has subcategories",
                id
            )));
        }
        if self.repository.books.category_in_use(id).await? {
            return Err(AppError::Conflict(format!("Category {} still holds books", id)));
        }

        self.repository.categories.deactivate(id).await?;
        tracing::info!(category_id = id, "Category deactivated");
        Ok(())
    }

    async fn require_parent(&self, parent_id: i32) -> AppResult<()> {
        match self.repository.categories.get_by_id(parent_id).await {
            Ok(_) => Ok(()),
            Err(AppError::NotFound(_)) => Err(AppError::Validation(format!(
                "Parent category {} does not exist",
                parent_id
            ))),
            Err(e) => Err(e),
        }
    }
}
