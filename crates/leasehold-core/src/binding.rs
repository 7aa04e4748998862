// Store binding: which store instance holds a job type's locks

use std::sync::Arc;

use leasehold_store::KvStore;

/// Store selection declared on a job descriptor
///
/// Resolved once per invocation. A dedicated store is an isolated namespace:
/// its keys are invisible to the shared store even under identical key strings.
#[derive(Debug, Clone, Default)]
pub enum StoreBinding {
    #[default]
    Shared,
    Dedicated(Arc<dyn KvStore>),
}

impl StoreBinding {
    pub fn resolve(&self, shared: &Arc<dyn KvStore>) -> Arc<dyn KvStore> {
        match self {
            StoreBinding::Shared => shared.clone(),
            StoreBinding::Dedicated(store) => store.clone(),
        }
    }

    pub fn is_dedicated(&self) -> bool {
        matches!(self, StoreBinding::Dedicated(_))
    }
}
