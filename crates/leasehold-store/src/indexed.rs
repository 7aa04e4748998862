//! Index-based check-and-set stores
//!
//! Consul-style stores version every key with a modify index and only offer
//! conditional writes against that index. [`CasEmulation`] lifts such a store
//! to the value-based [`KvStore`] contract with an optimistic
//! read-check-write loop: the conditional write only lands if nothing touched
//! the key since it was read, so exactly one of several racing writers wins.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::{KvStore, StoreError, StoreResult};

/// Default number of optimistic rounds before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// A value together with the index of its last modification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedValue {
    pub value: String,
    pub modify_index: u64,
}

/// Store offering conditional writes keyed on a modify index
#[async_trait]
pub trait IndexedKvStore: Send + Sync + std::fmt::Debug {
    async fn get_indexed(&self, key: &str) -> StoreResult<Option<IndexedValue>>;

    /// Write only if the key's modify index equals `index`.
    /// An index of 0 means "create only if the key does not exist".
    async fn put_cas(&self, key: &str, value: &str, index: u64) -> StoreResult<bool>;

    /// Delete only if the key's modify index equals `index`.
    async fn delete_cas(&self, key: &str, index: u64) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<bool>;
}

/// Value-based compare-and-set/delete on top of an [`IndexedKvStore`]
#[derive(Debug)]
pub struct CasEmulation<S> {
    inner: S,
    max_attempts: u32,
}

impl<S: IndexedKvStore> CasEmulation<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn exhausted(&self, key: &str) -> StoreError {
        StoreError::Contention {
            key: key.to_string(),
            attempts: self.max_attempts,
        }
    }
}

#[async_trait]
impl<S: IndexedKvStore> KvStore for CasEmulation<S> {
    async fn create_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.inner.put_cas(key, value, 0).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.get_indexed(key).await?.map(|current| current.value))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }

    async fn compare_and_set(&self, key: &str, expected: &str, new: &str) -> StoreResult<bool> {
        for attempt in 1..=self.max_attempts {
            let current = match self.inner.get_indexed(key).await? {
                Some(current) if current.value == expected => current,
                _ => return Ok(false),
            };
            if self.inner.put_cas(key, new, current.modify_index).await? {
                return Ok(true);
            }
            debug!(key = %key, attempt, "Index moved under compare-and-set, re-reading");
        }
        Err(self.exhausted(key))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        for attempt in 1..=self.max_attempts {
            let current = match self.inner.get_indexed(key).await? {
                Some(current) if current.value == expected => current,
                _ => return Ok(false),
            };
            if self.inner.delete_cas(key, current.modify_index).await? {
                return Ok(true);
            }
            debug!(key = %key, attempt, "Index moved under compare-and-delete, re-reading");
        }
        Err(self.exhausted(key))
    }
}

/// In-memory [`IndexedKvStore`] with a store-wide monotonic modify index
#[derive(Debug)]
pub struct MemoryIndexedStore {
    entries: DashMap<String, IndexedValue>,
    index: AtomicU64,
}

impl Default for MemoryIndexedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexedStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            index: AtomicU64::new(1),
        }
    }

    fn next_index(&self) -> u64 {
        self.index.fetch_add(1, Ordering::SeqCst)
    }

    /// Unconditional write; bumps the modify index
    pub fn put(&self, key: &str, value: &str) -> u64 {
        let modify_index = self.next_index();
        self.entries.insert(
            key.to_string(),
            IndexedValue {
                value: value.to_string(),
                modify_index,
            },
        );
        modify_index
    }
}

#[async_trait]
impl IndexedKvStore for MemoryIndexedStore {
    async fn get_indexed(&self, key: &str) -> StoreResult<Option<IndexedValue>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn put_cas(&self, key: &str, value: &str, index: u64) -> StoreResult<bool> {
        if index == 0 {
            return match self.entries.entry(key.to_string()) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(vacant) => {
                    vacant.insert(IndexedValue {
                        value: value.to_string(),
                        modify_index: self.next_index(),
                    });
                    Ok(true)
                }
            };
        }

        if let Some(mut existing) = self.entries.get_mut(key)
            && existing.modify_index == index
        {
            existing.value = value.to_string();
            existing.modify_index = self.next_index();
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_cas(&self, key: &str, index: u64) -> StoreResult<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, existing| existing.modify_index == index)
            .is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}
