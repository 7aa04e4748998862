//! Job descriptor and capability model

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use leasehold_store::KvStore;

use crate::binding::StoreBinding;
use crate::manager::Lease;

/// Derives a key fragment (or a whole key) from job arguments
pub type KeyFn<A> = Arc<dyn Fn(&A) -> String + Send + Sync>;

/// Observational callback fired by the lifecycle adapter
pub type LockHook<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// Optional hooks and configuration a job type may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    LockTimeout,
    Identifier,
    KeyOverride,
    DedicatedStore,
    LockFailedHook,
    ExpiredHook,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::LockTimeout,
        Capability::Identifier,
        Capability::KeyOverride,
        Capability::DedicatedStore,
        Capability::LockFailedHook,
        Capability::ExpiredHook,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::LockTimeout => "lock_timeout",
            Capability::Identifier => "identifier",
            Capability::KeyOverride => "key_override",
            Capability::DedicatedStore => "dedicated_store",
            Capability::LockFailedHook => "on_lock_failed",
            Capability::ExpiredHook => "on_lock_expired_before_release",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of declared capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub fn insert(&mut self, capability: Capability) {
        self.0 |= capability.bit();
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.insert(capability);
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL
            .into_iter()
            .filter(move |capability| self.contains(*capability))
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Lock configuration of a job type
///
/// Everything except the name is optional. Defaults: no lease, the key is
/// `<namespace>:<name>`, the shared store, and no-op callbacks.
pub struct JobDescriptor<A> {
    name: String,
    lock_timeout: Option<u64>,
    identifier: Option<KeyFn<A>>,
    key_override: Option<KeyFn<A>>,
    binding: StoreBinding,
    on_lock_failed: Option<LockHook<A>>,
    on_lock_expired: Option<LockHook<A>>,
}

impl<A> JobDescriptor<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lock_timeout: None,
            identifier: None,
            key_override: None,
            binding: StoreBinding::Shared,
            on_lock_failed: None,
            on_lock_expired: None,
        }
    }

    /// Lease length in seconds; without one the lock never expires
    pub fn with_lock_timeout(mut self, secs: u64) -> Self {
        self.lock_timeout = Some(secs);
        self
    }

    /// Lock per resource: append an argument-derived fragment to the default key
    pub fn with_identifier(mut self, f: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.identifier = Some(Arc::new(f));
        self
    }

    /// Replace the derived key entirely; the result is used verbatim
    pub fn with_lock_key(mut self, f: impl Fn(&A) -> String + Send + Sync + 'static) -> Self {
        self.key_override = Some(Arc::new(f));
        self
    }

    /// Keep this job type's locks in their own store
    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.binding = StoreBinding::Dedicated(store);
        self
    }

    pub fn on_lock_failed(mut self, f: impl Fn(&A) + Send + Sync + 'static) -> Self {
        self.on_lock_failed = Some(Arc::new(f));
        self
    }

    pub fn on_lock_expired_before_release(
        mut self,
        f: impl Fn(&A) + Send + Sync + 'static,
    ) -> Self {
        self.on_lock_expired = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lock_timeout(&self) -> Option<u64> {
        self.lock_timeout
    }

    pub fn identifier(&self) -> Option<&KeyFn<A>> {
        self.identifier.as_ref()
    }

    pub fn key_override(&self) -> Option<&KeyFn<A>> {
        self.key_override.as_ref()
    }

    pub fn binding(&self) -> &StoreBinding {
        &self.binding
    }

    pub(crate) fn lock_failed(&self, args: &A) {
        if let Some(hook) = &self.on_lock_failed {
            hook(args);
        }
    }

    pub(crate) fn lock_expired(&self, args: &A) {
        if let Some(hook) = &self.on_lock_expired {
            hook(args);
        }
    }

    /// Capabilities declared by this descriptor
    pub fn capabilities(&self) -> CapabilitySet {
        let mut set = CapabilitySet::default();
        if self.lock_timeout.is_some() {
            set.insert(Capability::LockTimeout);
        }
        if self.identifier.is_some() {
            set.insert(Capability::Identifier);
        }
        if self.key_override.is_some() {
            set.insert(Capability::KeyOverride);
        }
        if self.binding.is_dedicated() {
            set.insert(Capability::DedicatedStore);
        }
        if self.on_lock_failed.is_some() {
            set.insert(Capability::LockFailedHook);
        }
        if self.on_lock_expired.is_some() {
            set.insert(Capability::ExpiredHook);
        }
        set
    }
}

impl<A> fmt::Debug for JobDescriptor<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("lock_timeout", &self.lock_timeout)
            .field("binding", &self.binding)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// A job type a worker can execute under its lock
#[async_trait]
pub trait Job: Send + Sync {
    type Args: Send + Sync;

    fn descriptor(&self) -> &JobDescriptor<Self::Args>;

    /// Run the body while the lock is held. `lease` can extend a leased lock.
    async fn perform(&self, args: &Self::Args, lease: &mut Lease<'_>) -> anyhow::Result<()>;
}
