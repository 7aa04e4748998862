//! Leasehold command line
//!
//! `leasehold settings` prints the resolved lock settings; `leasehold simulate`
//! runs a fleet of in-process workers against one in-memory store to show how
//! the lock serializes them.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use leasehold_common::{Configuration, LockSettings, logging};
use leasehold_core::{
    Job, JobDescriptor, JobOutcome, JobRegistry, Lease, LockManager, LockedExecutor,
};
use leasehold_store::MemoryStore;
use serde::Serialize;
use tokio::sync::Barrier;
use tracing::{Level, info, warn};

const SIMULATED_JOB: &str = "SimulatedJob";

#[derive(Debug, Parser)]
#[command(name = "leasehold", version, about = "Lease-based job locks")]
struct Cli {
    /// Configuration file, defaults to conf/leasehold.yml when present
    #[arg(short = 'c', long = "config", env = "LEASEHOLD_CONFIG")]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resolved lock settings as JSON
    Settings,
    /// Run concurrent workers against an in-memory store
    Simulate {
        #[arg(short = 'w', long, default_value_t = 4)]
        workers: usize,
        /// Lease length in seconds; omit for locks without lease
        #[arg(short = 't', long)]
        timeout: Option<u64>,
        /// Invocations per worker
        #[arg(short = 'j', long, default_value_t = 10)]
        jobs: usize,
        /// Distinct resources the invocations are spread over
        #[arg(short = 'r', long, default_value_t = 1)]
        resources: usize,
        /// Time each body holds its lock
        #[arg(short = 'm', long = "work-ms", default_value_t = 20)]
        work_ms: u64,
    },
}

struct SimulatedJob {
    descriptor: JobDescriptor<String>,
    work: Duration,
}

#[async_trait]
impl Job for SimulatedJob {
    type Args = String;

    fn descriptor(&self) -> &JobDescriptor<String> {
        &self.descriptor
    }

    async fn perform(&self, _resource: &String, _lease: &mut Lease<'_>) -> anyhow::Result<()> {
        tokio::time::sleep(self.work).await;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    workers: usize,
    invocations: usize,
    executed: usize,
    skipped: usize,
    failed: usize,
    expired_before_release: usize,
    lock_failed_callbacks: usize,
}

impl Summary {
    fn record(&mut self, outcome: &JobOutcome) {
        self.invocations += 1;
        match outcome {
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Completed { .. } => self.executed += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
        }
        if outcome.expired_before_release() {
            self.expired_before_release += 1;
        }
    }
}

async fn simulate(
    settings: LockSettings,
    workers: usize,
    timeout: Option<u64>,
    jobs: usize,
    resources: usize,
    work_ms: u64,
) -> anyhow::Result<Summary> {
    anyhow::ensure!(workers > 0, "at least one worker is required");
    let resources = resources.max(1);

    let lock_failed = Arc::new(AtomicUsize::new(0));
    let counter = lock_failed.clone();
    let mut descriptor = JobDescriptor::new(SIMULATED_JOB)
        .on_lock_failed(move |_: &String| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .on_lock_expired_before_release(|resource: &String| {
            warn!(resource = %resource, "Simulated job outlived its lease");
        });
    if resources > 1 {
        descriptor = descriptor.with_identifier(|resource: &String| resource.clone());
    }
    if let Some(secs) = timeout {
        descriptor = descriptor.with_lock_timeout(secs);
    }

    let mut registry = JobRegistry::new();
    let profile = registry.register(&descriptor)?;
    info!(job = %profile.name, capabilities = %profile.capabilities, "Starting simulation");

    let manager = LockManager::new(Arc::new(MemoryStore::new())).with_settings(settings)?;
    let executor = LockedExecutor::new(Arc::new(manager));
    let job = Arc::new(SimulatedJob {
        descriptor,
        work: Duration::from_millis(work_ms),
    });

    let mut summary = Summary {
        workers,
        ..Summary::default()
    };
    for outcome in run_rounds(&executor, job, workers, jobs, resources).await? {
        summary.record(&outcome);
    }
    summary.lock_failed_callbacks = lock_failed.load(Ordering::Relaxed);
    Ok(summary)
}

/// Run `jobs` rounds in which every worker invokes `job` at the same instant
///
/// Each round is joined before the next starts, so a worker that fails cannot
/// leave the others waiting on the barrier.
async fn run_rounds<J>(
    executor: &LockedExecutor,
    job: Arc<J>,
    workers: usize,
    jobs: usize,
    resources: usize,
) -> anyhow::Result<Vec<JobOutcome>>
where
    J: Job<Args = String> + 'static,
{
    let mut outcomes = Vec::with_capacity(workers * jobs);
    for round in 0..jobs {
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let executor = executor.clone();
                let job = job.clone();
                let barrier = barrier.clone();
                let resource = format!("resource-{}", (worker + round) % resources);
                tokio::spawn(async move {
                    barrier.wait().await;
                    executor.perform(job.as_ref(), &resource).await
                })
            })
            .collect();

        let mut first_error = None;
        for handle in handles {
            match handle.await? {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }
    }
    Ok(outcomes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(cli.config.as_deref())?;

    let mut logging_config = configuration.logging_config();
    if cli.verbose {
        logging_config = logging_config.with_level(Level::DEBUG);
    }
    let _logging_guard = logging::init_logging(&logging_config)?;

    let settings = configuration.lock_settings()?;

    match cli.command {
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Simulate {
            workers,
            timeout,
            jobs,
            resources,
            work_ms,
        } => {
            let summary = simulate(settings, workers, timeout, jobs, resources, work_ms).await?;
            info!(
                executed = summary.executed,
                skipped = summary.skipped,
                "Simulation finished"
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
