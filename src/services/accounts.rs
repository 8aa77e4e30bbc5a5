//! Borrower accounts

use validator::Validate;

use crate::{
    error::AppResult,
    models::user::{CreateUser, UpdateUser, User, UserQuery},
    repository::Repository,
};

#[derive(Clone)]
pub struct AccountsService {
    repository: Repository,
}

impl AccountsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn search_users(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        self.repository.users.search(query).await
    }

    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        user.validate()?;
        let created = self.repository.users.create(&user).await?;
        tracing::info!(user_id = created.id, username = %created.username, "User created");
        Ok(created)
    }

    /// Update profile, role, status or borrow limit
    pub async fn update_user(&self, id: i32, update: UpdateUser) -> AppResult<User> {
        update.validate()?;
        let user = self.repository.users.update(id, update).await?;
        tracing::info!(user_id = id, status = %user.status, "User updated");
        Ok(user)
    }
}
