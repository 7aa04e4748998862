//! Leasehold Core - lease-based mutual exclusion for jobs
//!
//! This crate provides:
//! - Lock key derivation from a job's name and arguments
//! - Per-job store bindings (shared store or a dedicated one)
//! - The lock manager: fail-fast acquire, expiry steal, compare-and-delete release
//! - Job descriptors, capability lint and registration
//! - The lifecycle adapter a worker wraps each job execution with

pub mod adapter;
pub mod binding;
pub mod job;
pub mod key;
pub mod manager;

pub use adapter::{JobOutcome, LockedExecutor};
pub use binding::StoreBinding;
pub use job::{
    Capability, CapabilitySet, Job, JobDescriptor, JobProfile, JobRegistry, KeyFn, LockHook, lint,
};
pub use key::KeyBuilder;
pub use manager::{HeldLock, Lease, LockManager, LockRef, LockState, ReleaseOutcome};

pub use leasehold_common::{Clock, LeaseholdError, LockSettings, ManualClock, SystemClock};
pub use leasehold_store::{KvStore, MemoryStore, StoreError};
