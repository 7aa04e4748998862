//! Lock key derivation
//!
//! Default keys are `<namespace>:<job name>`, so every invocation of a job type
//! shares one lock. An identifier narrows the lock to a resource
//! (`<namespace>:<job name>:<identifier>`); a key override replaces the key
//! outright and skips the namespace.

use leasehold_common::{DEFAULT_NAMESPACE, KEY_SEPARATOR};

use crate::job::JobDescriptor;

#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key shared by every invocation of a job type
    pub fn default_key(&self, job_name: &str) -> String {
        format!("{}{}{}", self.namespace, KEY_SEPARATOR, job_name)
    }

    /// Key for one invocation. Pure: same descriptor and args, same key.
    pub fn key_for<A>(&self, descriptor: &JobDescriptor<A>, args: &A) -> String {
        if let Some(key_fn) = descriptor.key_override() {
            return key_fn(args);
        }

        let base = self.default_key(descriptor.name());
        match descriptor.identifier().map(|identifier| identifier(args)) {
            Some(id) if !id.is_empty() => format!("{}{}{}", base, KEY_SEPARATOR, id),
            _ => base,
        }
    }
}
