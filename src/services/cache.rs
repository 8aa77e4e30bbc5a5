//! Cache collaborator used for book representations

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

/// Cache key of a book representation
pub fn book_key(book_id: i32) -> String {
    format!("book:{}", book_id)
}

/// Key-value cache with expiring entries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()>;

    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Process-local cache, used when no Redis is configured and in tests
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("Memory cache lock poisoned".to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries()
            .map(|entries| entries.get(key).is_some_and(|(_, expires)| *expires > Instant::now()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut entries = self.entries()?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()> {
        let expires = Instant::now() + Duration::from_secs(ttl_seconds);
        self.entries()?
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache.set("book:1", "{}", 60).await.unwrap();
        cache.set("book:2", "{}", 0).await.unwrap();

        assert_eq!(cache.get("book:1").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(cache.get("book:2").await.unwrap(), None);

        cache.delete("book:1").await.unwrap();
        assert!(!cache.contains("book:1"));
    }

    #[test]
    fn book_keys_are_namespaced() {
        assert_eq!(book_key(42), "book:42");
    }
}
