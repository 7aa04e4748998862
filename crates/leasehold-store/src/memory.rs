// In-memory key-value store
// Each primitive runs under a single DashMap shard lock, which makes it atomic

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::{KvStore, StoreResult};

/// In-memory store using DashMap
///
/// Separate instances never share keys, so two instances behave like two
/// independent store bindings.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional write, bypassing the lock protocol
    pub fn put(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn create_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(value.to_string());
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn compare_and_set(&self, key: &str, expected: &str, new: &str) -> StoreResult<bool> {
        if let Some(mut current) = self.entries.get_mut(key)
            && current.as_str() == expected
        {
            *current = new.to_string();
            return Ok(true);
        }
        Ok(false)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, current| current == expected)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_create_if_absent() {
        let store = MemoryStore::new();

        assert!(store.create_if_absent("k", "v1").await.unwrap());
        assert!(!store.create_if_absent("k", "v2").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let store = MemoryStore::new();
        store.put("k", "100");

        assert!(!store.compare_and_set("k", "99", "200").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("100"));

        assert!(store.compare_and_set("k", "100", "200").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("200"));

        // Absent keys are never created by a conditional write
        assert!(!store.compare_and_set("missing", "", "x").await.unwrap());
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = MemoryStore::new();
        store.put("k", "mine");

        assert!(!store.compare_and_delete("k", "theirs").await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());

        assert!(store.compare_and_delete("k", "mine").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.compare_and_delete("k", "mine").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.put("k", "v");
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_has_one_winner() {
        let store = Arc::new(MemoryStore::new());

        let attempts = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create_if_absent("contended", &format!("worker-{}", i))
                    .await
                    .unwrap()
            })
        });

        let winners = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }
}
