//! Leasehold Store - the key-value primitives locks are built on
//!
//! The lock protocol needs exactly five atomic operations from a store:
//! create-if-absent, get, delete, compare-and-set and compare-and-delete.
//! Stores that only offer index-based check-and-set (Consul style) get the
//! value-based pair through [`CasEmulation`].

use async_trait::async_trait;

pub use leasehold_common::StoreError;

mod indexed;
mod memory;

pub use indexed::{CasEmulation, IndexedKvStore, IndexedValue, MemoryIndexedStore};
pub use memory::MemoryStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Atomic key-value primitives consumed by the lock manager.
///
/// Every method is a single round trip and must be atomic on its own; the lock
/// layer never wraps two calls in a local critical section.
#[async_trait]
pub trait KvStore: Send + Sync + std::fmt::Debug {
    /// Write `value` only if `key` is absent. Returns whether the write happened.
    async fn create_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditional delete. Returns whether a key was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Replace the value only if it currently equals `expected`.
    async fn compare_and_set(&self, key: &str, expected: &str, new: &str) -> StoreResult<bool>;

    /// Delete the key only if its value currently equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;
}
