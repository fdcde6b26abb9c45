//! Session store contract and in-process implementation
//!
//! The engine only requires a key-value contract with TTLs plus FIFO list
//! operations; adapters implement this trait to provide the actual backend.
//! `MemorySessionStore` is the in-process adapter used by default.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Durable key-value + list store used for player records, match snapshots,
/// and the matchmaking queue.
///
/// Not-found is `Ok(None)` (or a no-op for `delete`), distinct from `Err`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value; `ttl = None` means the entry never expires
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn list_push_back(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn list_peek_front(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Failed to encode/decode stored value: {0}")]
    Serialization(#[from] serde_json::Error),
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process session store backed by concurrent maps
///
/// Expired entries are dropped lazily on access.
#[derive(Default)]
pub struct MemorySessionStore {
    values: DashMap<String, Entry>,
    lists: DashMap<String, VecDeque<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(entry) = self.values.get(key) {
            if !entry.expired() {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        // Fell through: present but expired
        self.values.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.values.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn list_peek_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lists
            .get(key)
            .and_then(|list| list.front().cloned()))
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lists
            .get_mut(key)
            .and_then(|mut list| list.pop_front()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_distinguishes_missing_from_present() {
        let store = MemorySessionStore::new();
        assert_eq!(store.get("nope").await.unwrap(), None);

        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let store = MemorySessionStore::new();
        store
            .set("short", "lived", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(store.get("short").await.unwrap().as_deref(), Some("lived"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lists_are_fifo() {
        let store = MemorySessionStore::new();
        assert_eq!(store.list_pop_front("q").await.unwrap(), None);

        store.list_push_back("q", "a").await.unwrap();
        store.list_push_back("q", "b").await.unwrap();

        assert_eq!(store.list_peek_front("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.list_pop_front("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.list_pop_front("q").await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.list_pop_front("q").await.unwrap(), None);
    }
}
