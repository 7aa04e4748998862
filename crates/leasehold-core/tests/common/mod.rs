//! Shared fixtures for lock lifecycle tests
//!
//! - ScriptedJob: a job whose body is picked per test
//! - FailingStore: a store whose every call errors
//! - run_workers: start several workers on the same job at once

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use leasehold_core::{
    Job, JobDescriptor, JobOutcome, KvStore, Lease, LockManager, LockedExecutor, ManualClock,
    MemoryStore, StoreError,
};
use tokio::sync::Barrier;

pub const START: i64 = 1_700_000_000;

/// What a scripted job does while holding its lock
pub enum Body {
    Sleep(Duration),
    Fail,
    Panic,
    /// Move the shared clock forward, simulating a long run
    Advance(Arc<ManualClock>, i64),
    /// Advance the clock one second at a time, refreshing the lease after each step
    RefreshEvery(Arc<ManualClock>, usize),
    /// Another worker takes the key over while the body runs
    Overwrite(Arc<dyn KvStore>, String, String),
}

pub struct ScriptedJob {
    descriptor: JobDescriptor<String>,
    body: Body,
    pub runs: AtomicUsize,
}

impl ScriptedJob {
    pub fn new(descriptor: JobDescriptor<String>, body: Body) -> Self {
        Self {
            descriptor,
            body,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for ScriptedJob {
    type Args = String;

    fn descriptor(&self) -> &JobDescriptor<String> {
        &self.descriptor
    }

    async fn perform(&self, args: &String, lease: &mut Lease<'_>) -> anyhow::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.body {
            Body::Sleep(duration) => tokio::time::sleep(*duration).await,
            Body::Fail => anyhow::bail!("{} failed", args),
            Body::Panic => panic!("{} panicked", args),
            Body::Advance(clock, secs) => {
                clock.advance(*secs);
            }
            Body::RefreshEvery(clock, steps) => {
                for _ in 0..*steps {
                    clock.advance(1);
                    anyhow::ensure!(lease.refresh().await?, "lease on {} lost", lease.key());
                }
            }
            Body::Overwrite(store, key, value) => {
                store.delete(key).await?;
                store.create_if_absent(key, value).await?;
            }
        }
        Ok(())
    }
}

/// Counter a hook can bump
pub fn counter() -> (Arc<AtomicUsize>, impl Fn(&String) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let hook_count = count.clone();
    (count, move |_: &String| {
        hook_count.fetch_add(1, Ordering::SeqCst);
    })
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub executor: LockedExecutor,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(START));
        let manager = LockManager::new(store.clone()).with_clock(clock.clone());
        Self {
            store,
            clock,
            executor: LockedExecutor::new(Arc::new(manager)),
        }
    }
}

/// Start `workers` executions of the same job, released together
pub async fn run_workers(
    executor: &LockedExecutor,
    job: Arc<ScriptedJob>,
    args: &str,
    workers: usize,
) -> Vec<JobOutcome> {
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let executor = executor.clone();
            let job = job.clone();
            let barrier = barrier.clone();
            let args = args.to_string();
            tokio::spawn(async move {
                barrier.wait().await;
                executor.perform(job.as_ref(), &args).await
            })
        })
        .collect();

    let mut outcomes = Vec::with_capacity(workers);
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }
    outcomes
}

/// Store that is always down
#[derive(Debug, Default)]
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl KvStore for FailingStore {
    async fn create_if_absent(&self, _key: &str, _value: &str) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(down())
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: &str,
        _new: &str,
    ) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &str) -> Result<bool, StoreError> {
        Err(down())
    }
}
