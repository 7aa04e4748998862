//! Error types for Leasehold
//!
//! Lock contention and stale releases are ordinary outcomes and never show up
//! here. What does show up:
//! - `StoreError`: the key-value store could not complete a primitive
//! - `LeaseholdError`: everything a caller of the lock layer can be handed back

/// Failures raised by a key-value store backend
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("conditional write on '{key}' kept losing after {attempts} attempts")]
    Contention { key: String, attempts: u32 },
}

/// Application-level error type
#[derive(thiserror::Error, Debug)]
pub enum LeaseholdError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("job misconfigured: {0}")]
    Misconfigured(String),

    #[error("job '{0}' already registered")]
    DuplicateJob(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("logging error: {0}")]
    Logging(String),
}

impl LeaseholdError {
    /// Whether the error came from the store rather than from local setup
    pub fn is_store(&self) -> bool {
        matches!(self, LeaseholdError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, LeaseholdError>;
