//! Registration-time validation of job types

use leasehold_common::{LeaseholdError, Result};
use tracing::{info, warn};

use super::model::{Capability, CapabilitySet, JobDescriptor};

/// Check that a descriptor can drive the lock protocol
///
/// Runs once at registration, never per invocation. Returns the declared
/// capability set on success.
pub fn lint<A>(descriptor: &JobDescriptor<A>) -> Result<CapabilitySet> {
    let capabilities = descriptor.capabilities();
    let name = descriptor.name();

    if name.trim().is_empty() && !capabilities.contains(Capability::KeyOverride) {
        return Err(LeaseholdError::Misconfigured(
            "job has no name and no lock key override, no lock key can be derived".to_string(),
        ));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(LeaseholdError::Misconfigured(format!(
            "job name '{}' contains whitespace",
            name
        )));
    }
    if descriptor.lock_timeout() == Some(0) {
        return Err(LeaseholdError::Misconfigured(format!(
            "lock timeout of job '{}' must be greater than zero",
            name
        )));
    }

    if capabilities.contains(Capability::ExpiredHook)
        && !capabilities.contains(Capability::LockTimeout)
    {
        warn!(
            job = %name,
            "Expired-before-release hook declared on a lock without timeout; it only fires if the lock is cleared externally"
        );
    }

    Ok(capabilities)
}

/// What the registry remembers about a job type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProfile {
    pub name: String,
    pub capabilities: CapabilitySet,
    pub lock_timeout: Option<u64>,
}

/// Registry of linted job types
#[derive(Debug, Default)]
pub struct JobRegistry {
    profiles: Vec<JobProfile>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lint and register a job type
    pub fn register<A>(&mut self, descriptor: &JobDescriptor<A>) -> Result<&JobProfile> {
        let capabilities = lint(descriptor)?;
        let name = descriptor.name();

        if self.get(name).is_some() {
            return Err(LeaseholdError::DuplicateJob(name.to_string()));
        }

        info!(job = %name, capabilities = %capabilities, "Job type registered");

        self.profiles.push(JobProfile {
            name: name.to_string(),
            capabilities,
            lock_timeout: descriptor.lock_timeout(),
        });
        Ok(&self.profiles[self.profiles.len() - 1])
    }

    /// Get profile by job name
    pub fn get(&self, name: &str) -> Option<&JobProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// List all registered job names
    pub fn list(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lint_accepts_plain_job() {
        let descriptor: JobDescriptor<()> = JobDescriptor::new("SlowJob");
        assert!(lint(&descriptor).unwrap().is_empty());
    }

    #[test]
    fn test_lint_rejects_underivable_key() {
        let descriptor: JobDescriptor<()> = JobDescriptor::new("");
        assert!(matches!(
            lint(&descriptor),
            Err(LeaseholdError::Misconfigured(_))
        ));

        // An explicit key makes the name optional
        let descriptor: JobDescriptor<()> =
            JobDescriptor::new("").with_lock_key(|_| "specific_redis".to_string());
        assert!(lint(&descriptor).is_ok());
    }

    #[test]
    fn test_lint_rejects_zero_timeout_and_whitespace() {
        let descriptor: JobDescriptor<()> = JobDescriptor::new("FastJob").with_lock_timeout(0);
        assert!(lint(&descriptor).is_err());

        let descriptor: JobDescriptor<()> = JobDescriptor::new("Fast Job");
        assert!(lint(&descriptor).is_err());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = JobRegistry::new();
        let descriptor: JobDescriptor<()> = JobDescriptor::new("SlowWithTimeoutJob")
            .with_lock_timeout(60)
            .on_lock_failed(|_| {});

        let profile = registry.register(&descriptor).unwrap();
        assert_eq!(profile.lock_timeout, Some(60));
        assert!(profile.capabilities.contains(Capability::LockFailedHook));

        assert!(matches!(
            registry.register(&descriptor),
            Err(LeaseholdError::DuplicateJob(name)) if name == "SlowWithTimeoutJob"
        ));
        assert_eq!(registry.list(), vec!["SlowWithTimeoutJob"]);
    }

    #[test]
    fn test_registry_does_not_keep_invalid_jobs() {
        let mut registry = JobRegistry::new();
        let descriptor: JobDescriptor<()> = JobDescriptor::new("Broken").with_lock_timeout(0);
        assert!(registry.register(&descriptor).is_err());
        assert!(registry.get("Broken").is_none());
    }
}
