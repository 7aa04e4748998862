//! Lifecycle adapter
//!
//! Wraps one job execution: acquire before the body, skip it on contention,
//! and release after it whether it succeeded, failed or panicked.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use leasehold_common::{LeaseholdError, Result};
use tracing::{debug, error, warn};

use crate::job::Job;
use crate::manager::LockManager;

/// How a guarded execution ended
#[derive(Debug)]
pub enum JobOutcome {
    /// The lock was held elsewhere; the body did not run
    Skipped,
    Completed {
        expired_before_release: bool,
    },
    /// The body returned an error. The lock was still released.
    Failed {
        error: anyhow::Error,
        expired_before_release: bool,
    },
}

impl JobOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, JobOutcome::Skipped)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }

    pub fn ran(&self) -> bool {
        !self.is_skipped()
    }

    pub fn expired_before_release(&self) -> bool {
        match self {
            JobOutcome::Skipped => false,
            JobOutcome::Completed {
                expired_before_release,
            }
            | JobOutcome::Failed {
                expired_before_release,
                ..
            } => *expired_before_release,
        }
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            JobOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Runs jobs under their locks
#[derive(Debug, Clone)]
pub struct LockedExecutor {
    manager: Arc<LockManager>,
}

impl LockedExecutor {
    pub fn new(manager: Arc<LockManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<LockManager> {
        &self.manager
    }

    /// Execute `job` at most once across all workers sharing the lock
    ///
    /// Store errors abort the execution and propagate. When the store fails
    /// during release, the body's own error is logged before the store error is
    /// returned. A panicking body is resumed after its lock is released.
    pub async fn perform<J>(&self, job: &J, args: &J::Args) -> Result<JobOutcome>
    where
        J: Job + ?Sized,
    {
        let descriptor = job.descriptor();
        let lock = self.manager.lock_ref(descriptor, args);
        if lock.key().is_empty() {
            return Err(LeaseholdError::Misconfigured(format!(
                "job '{}' derived an empty lock key",
                descriptor.name()
            )));
        }

        let acquired = match self.manager.acquire(&lock).await {
            Ok(acquired) => acquired,
            Err(e) => {
                error!(job = %descriptor.name(), key = %lock.key(), error = %e, "Lock acquisition failed");
                return Err(e.into());
            }
        };
        let Some(held) = acquired else {
            debug!(job = %descriptor.name(), key = %lock.key(), "Lock held elsewhere, skipping job");
            descriptor.lock_failed(args);
            return Ok(JobOutcome::Skipped);
        };

        let mut lease = self.manager.lease(held);
        let result = AssertUnwindSafe(job.perform(args, &mut lease))
            .catch_unwind()
            .await;

        let released = match self.manager.release(lease.into_held()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job = %descriptor.name(), key = %lock.key(), error = %e, "Lock release failed");
                match &result {
                    Ok(Err(body_error)) => {
                        error!(job = %descriptor.name(), error = %body_error, "Job failed before lock release error")
                    }
                    Err(_) => {
                        error!(job = %descriptor.name(), "Job panicked before lock release error")
                    }
                    Ok(Ok(())) => {}
                }
                if let Err(payload) = result {
                    panic::resume_unwind(payload);
                }
                return Err(e.into());
            }
        };

        let expired_before_release = !released.is_clean();
        if expired_before_release {
            warn!(
                job = %descriptor.name(),
                key = %lock.key(),
                outcome = ?released,
                "Job outlived its lock"
            );
            descriptor.lock_expired(args);
        }

        match result {
            Ok(Ok(())) => Ok(JobOutcome::Completed {
                expired_before_release,
            }),
            Ok(Err(error)) => Ok(JobOutcome::Failed {
                error,
                expired_before_release,
            }),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}
