//! Business logic services

pub mod accounts;
pub mod borrows;
pub mod cache;
pub mod catalog;
pub mod categories;
pub mod ledger;
pub mod redis;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::AppResult,
    repository::{LedgerStore, Repository},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub ledger: ledger::LedgerService,
    pub borrows: borrows::BorrowsService,
    pub catalog: catalog::CatalogService,
    pub categories: categories::CategoriesService,
    pub accounts: accounts::AccountsService,
    repository: Repository,
}

impl Services {
    /// Create all services over one repository, ledger store and cache
    pub fn new(
        repository: Repository,
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn cache::Cache>,
        config: &AppConfig,
    ) -> Self {
        Self {
            ledger: ledger::LedgerService::new(store, cache.clone(), config.ledger.clone()),
            borrows: borrows::BorrowsService::new(repository.clone()),
            catalog: catalog::CatalogService::new(
                repository.clone(),
                cache,
                config.cache.book_ttl_seconds,
            ),
            categories: categories::CategoriesService::new(repository.clone()),
            accounts: accounts::AccountsService::new(repository.clone()),
            repository,
        }
    }

    /// Round-trip to the database
    pub async fn check_database(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
