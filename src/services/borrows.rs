//! Borrow record queries

use chrono::Utc;

use crate::{
    error::AppResult,
    models::{
        borrow::{BorrowQuery, BorrowRecordDetails, BorrowStatistics},
        Page,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowsService {
    repository: Repository,
}

impl BorrowsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get one record with display fields
    pub async fn get(&self, id: i32) -> AppResult<BorrowRecordDetails> {
        self.repository.borrows.get_details(id).await
    }

    /// Search records; `only_user` pins the search to one borrower
    pub async fn search(
        &self,
        query: &BorrowQuery,
        only_user: Option<i32>,
    ) -> AppResult<(Vec<BorrowRecordDetails>, i64)> {
        self.repository.borrows.search(query, only_user).await
    }

    /// Records of one user
    pub async fn user_records(
        &self,
        user_id: i32,
        query: &BorrowQuery,
    ) -> AppResult<(Vec<BorrowRecordDetails>, i64)> {
        // Verify user exists
        self.repository.users.get_by_id(user_id).await?;
        self.repository.borrows.search(query, Some(user_id)).await
    }

    /// Late loans, open or closed
    pub async fn overdue(&self, page: Page) -> AppResult<(Vec<BorrowRecordDetails>, i64)> {
        self.repository.borrows.overdue(Utc::now(), page).await
    }

    pub async fn statistics(&self) -> AppResult<BorrowStatistics> {
        self.repository.borrows.statistics().await
    }
}
