//! Lock manager
//!
//! Implements the lock protocol on top of the five store primitives:
//! - acquire: create-if-absent, and for expired leases a compare-and-set steal
//! - release: compare-and-delete against the exact value this holder wrote
//! - is_locked: plain existence check, expiry is not evaluated
//!
//! Expiry is lazy. Nothing sweeps stale keys; the next acquirer steals them.
//! Lease values are absolute epoch seconds and are always parsed as integers
//! before comparison.

use std::sync::Arc;

use leasehold_common::{Clock, LockSettings, Result, SystemClock};
use leasehold_store::{KvStore, StoreResult};
use tracing::{debug, info, warn};

use crate::job::JobDescriptor;
use crate::key::KeyBuilder;

/// A resolved lock: key, the store it lives in, and its lease length
#[derive(Debug, Clone)]
pub struct LockRef {
    key: String,
    store: Arc<dyn KvStore>,
    ttl: Option<u64>,
}

impl LockRef {
    pub fn new(key: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self {
            key: key.into(),
            store,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, secs: u64) -> Self {
        self.ttl = Some(secs);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }
}

/// Proof of a successful acquisition
///
/// Carries the exact value written, which is what release and refresh compare
/// against.
#[derive(Debug)]
pub struct HeldLock {
    key: String,
    store: Arc<dyn KvStore>,
    value: String,
    ttl: Option<u64>,
    expires_at: Option<i64>,
    stolen: bool,
}

impl HeldLock {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    /// Whether this acquisition took over an expired lease
    pub fn was_stolen(&self) -> bool {
        self.stolen
    }
}

/// A held lock as seen from inside a running job
///
/// Lets a long-running body extend its lease without owning the lock.
#[derive(Debug)]
pub struct Lease<'a> {
    manager: &'a LockManager,
    held: HeldLock,
}

impl Lease<'_> {
    pub fn key(&self) -> &str {
        self.held.key()
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.held.expires_at()
    }

    pub fn was_stolen(&self) -> bool {
        self.held.was_stolen()
    }

    /// Push the lease out to `now + ttl`; `false` if the lock is no longer ours
    pub async fn refresh(&mut self) -> StoreResult<bool> {
        self.manager.refresh(&mut self.held).await
    }

    pub fn into_held(self) -> HeldLock {
        self.held
    }
}

/// Result of a release attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Our value was still in place and has been deleted
    Released,
    /// The key was already gone before our lease ran out
    AlreadyReleased,
    /// Our lease ran out before release; nobody else holds the key now.
    /// `deleted` tells whether our stale key was still there to remove.
    Expired { deleted: bool },
    /// Another holder's value is in place; it was left untouched
    Superseded,
}

impl ReleaseOutcome {
    /// Released without the lease having lapsed or the lock changing hands
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            ReleaseOutcome::Released | ReleaseOutcome::AlreadyReleased
        )
    }

    pub fn deleted(&self) -> bool {
        matches!(
            self,
            ReleaseOutcome::Released | ReleaseOutcome::Expired { deleted: true }
        )
    }
}

/// What is currently stored under a lock key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// Held without a lease
    Marker,
    Leased { expires_at: i64, expired: bool },
    /// Neither the marker nor an epoch value
    Unrecognized(String),
}

fn parse_expiry(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

/// Lock manager bound to a shared store and a clock
#[derive(Debug)]
pub struct LockManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    settings: LockSettings,
    keys: KeyBuilder,
}

impl LockManager {
    /// Create a manager over the shared store with the system clock and default settings
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            settings: LockSettings::default(),
            keys: KeyBuilder::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the lock settings. Rejects settings that fail validation.
    pub fn with_settings(mut self, settings: LockSettings) -> Result<Self> {
        settings.validate()?;
        self.keys = KeyBuilder::new(settings.namespace.clone());
        self.settings = settings;
        Ok(self)
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// Resolve the lock for one job invocation
    ///
    /// A configured timeout override takes precedence over the descriptor's.
    pub fn lock_ref<A>(&self, descriptor: &JobDescriptor<A>, args: &A) -> LockRef {
        LockRef {
            key: self.keys.key_for(descriptor, args),
            store: descriptor.binding().resolve(&self.store),
            ttl: self
                .settings
                .timeout_for(descriptor.name())
                .or(descriptor.lock_timeout()),
        }
    }

    fn lease_value(&self, ttl: Option<u64>) -> (String, Option<i64>) {
        match ttl {
            Some(ttl) => {
                let expires_at = self.clock.now().saturating_add_unsigned(ttl);
                (expires_at.to_string(), Some(expires_at))
            }
            None => (self.settings.marker.clone(), None),
        }
    }

    /// Try to take the lock. Never waits and never retries.
    ///
    /// Returns `None` when the lock is validly held elsewhere or another
    /// worker won the race to steal an expired lease.
    pub async fn acquire(&self, lock: &LockRef) -> StoreResult<Option<HeldLock>> {
        let (value, expires_at) = self.lease_value(lock.ttl);
        let held = |stolen: bool, value: String| HeldLock {
            key: lock.key.clone(),
            store: lock.store.clone(),
            value,
            ttl: lock.ttl,
            expires_at,
            stolen,
        };

        if lock.store.create_if_absent(&lock.key, &value).await? {
            debug!(key = %lock.key, value = %value, "Lock acquired");
            return Ok(Some(held(false, value)));
        }

        // Locks without a lease can only be removed by their holder
        if lock.ttl.is_none() {
            debug!(key = %lock.key, "Lock held, no lease to expire");
            return Ok(None);
        }

        let Some(current) = lock.store.get(&lock.key).await? else {
            debug!(key = %lock.key, "Lock released while contending, not retrying");
            return Ok(None);
        };

        let Some(current_expiry) = parse_expiry(&current) else {
            warn!(key = %lock.key, value = %current, "Lock value is not a lease expiry, treating as held");
            return Ok(None);
        };

        let now = self.clock.now();
        if current_expiry >= now {
            debug!(key = %lock.key, expires_at = current_expiry, "Lock held, lease still valid");
            return Ok(None);
        }

        if lock
            .store
            .compare_and_set(&lock.key, &current, &value)
            .await?
        {
            info!(
                key = %lock.key,
                expired_at = current_expiry,
                expires_at = %value,
                "Expired lock stolen"
            );
            return Ok(Some(held(true, value)));
        }

        debug!(key = %lock.key, "Lost the race to steal an expired lock");
        Ok(None)
    }

    /// Release a held lock without ever touching another holder's value
    pub async fn release(&self, held: HeldLock) -> StoreResult<ReleaseOutcome> {
        let lapsed = held.expires_at.is_some_and(|e| e < self.clock.now());
        let deleted = held
            .store
            .compare_and_delete(&held.key, &held.value)
            .await?;

        let outcome = match (deleted, lapsed) {
            (true, false) => ReleaseOutcome::Released,
            (true, true) => ReleaseOutcome::Expired { deleted: true },
            (false, _) => match held.store.get(&held.key).await? {
                Some(_) => ReleaseOutcome::Superseded,
                None if lapsed => ReleaseOutcome::Expired { deleted: false },
                None => ReleaseOutcome::AlreadyReleased,
            },
        };

        if outcome.is_clean() {
            debug!(key = %held.key, outcome = ?outcome, "Lock released");
        } else {
            warn!(key = %held.key, outcome = ?outcome, "Lock expired before release");
        }
        Ok(outcome)
    }

    /// Extend the lease of a lock this worker still holds
    ///
    /// Returns `false` without writing if the stored value is no longer ours.
    /// A lock without lease only checks that it is still held by value.
    pub async fn refresh(&self, held: &mut HeldLock) -> StoreResult<bool> {
        let Some(ttl) = held.ttl else {
            let current = held.store.get(&held.key).await?;
            return Ok(current.as_deref() == Some(held.value.as_str()));
        };

        let (value, expires_at) = self.lease_value(Some(ttl));
        if !held
            .store
            .compare_and_set(&held.key, &held.value, &value)
            .await?
        {
            warn!(key = %held.key, "Lock changed hands, lease not refreshed");
            return Ok(false);
        }

        debug!(key = %held.key, expires_at = %value, "Lease refreshed");
        held.value = value;
        held.expires_at = expires_at;
        Ok(true)
    }

    /// Wrap a held lock for use inside a job body
    pub fn lease(&self, held: HeldLock) -> Lease<'_> {
        Lease {
            manager: self,
            held,
        }
    }

    /// Whether the key exists. A lapsed lease still counts as locked.
    pub async fn is_locked(&self, lock: &LockRef) -> StoreResult<bool> {
        Ok(lock.store.get(&lock.key).await?.is_some())
    }

    pub async fn inspect(&self, lock: &LockRef) -> StoreResult<Option<LockState>> {
        let Some(value) = lock.store.get(&lock.key).await? else {
            return Ok(None);
        };

        let state = match parse_expiry(&value) {
            Some(expires_at) => LockState::Leased {
                expires_at,
                expired: expires_at < self.clock.now(),
            },
            None if value == self.settings.marker => LockState::Marker,
            None => LockState::Unrecognized(value),
        };
        Ok(Some(state))
    }

    /// Unconditionally remove a lock
    ///
    /// Operator path for locks without lease whose holder died. The lifecycle
    /// adapter never calls this.
    pub async fn clear(&self, lock: &LockRef) -> StoreResult<bool> {
        let removed = lock.store.delete(&lock.key).await?;
        warn!(key = %lock.key, removed, "Lock cleared by operator");
        Ok(removed)
    }
}
