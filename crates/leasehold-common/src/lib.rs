//! Leasehold Common - Shared types, clock, configuration and logging
//!
//! This crate provides the foundational pieces used across all Leasehold components:
//! - Error types for store failures and misconfiguration
//! - The `Clock` abstraction that lease values are computed from
//! - Lock settings loaded through the `config` crate
//! - Logging bootstrap for binaries

pub mod clock;
pub mod settings;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use settings::{Configuration, LockSettings};
pub use error::{LeaseholdError, Result, StoreError};

/// Default key namespace prepended to derived lock keys
pub const DEFAULT_NAMESPACE: &str = "lock";

/// Default value written for locks that carry no lease
pub const DEFAULT_MARKER: &str = "true";

/// Separator between key segments
pub const KEY_SEPARATOR: &str = ":";
