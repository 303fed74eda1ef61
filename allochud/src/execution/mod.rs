//! Benchmark execution under the memory profiler
//!
//! A single run goes through four steps:
//!
//! 1. reserve unique artifact paths ([`ProfileArtifacts`])
//! 2. `go test -bench '^Name$' -memprofile ...` in the package directory
//! 3. `go tool pprof -list <module scope>`, streamed through the listing parser
//! 4. remove the artifacts, whatever happened before
//!
//! Batches admit at most `jobs` runs at a time through a semaphore. Every
//! run holds its permit as an RAII guard, so failed and cancelled runs free
//! their slot without any bookkeeping.

pub mod artifact;

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cache::StructureCache;
use crate::classification::SourceScope;
use crate::domain::{AllocationRecord, BenchmarkKey, CacheError, ExecutionError, ToolchainError};
use crate::profile::{ListingParser, ParseOutcome};
use crate::toolchain::go::module_scope_pattern;
use crate::toolchain::Toolchain;

pub use artifact::ProfileArtifacts;

/// Runs admitted at once unless configured otherwise
pub const DEFAULT_JOBS: usize = 3;

/// Upper bound accepted for `jobs`
pub const MAX_JOBS: usize = 16;

/// How one benchmark run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Allocation sites in user code, in listing order
    Allocations(Vec<AllocationRecord>),
    /// The run succeeded but allocated nothing attributable to user code
    NoneFound,
    /// Human-readable failure description
    Failed(String),
    Cancelled,
}

impl RunOutcome {
    #[must_use]
    pub fn records(&self) -> &[AllocationRecord] {
        match self {
            RunOutcome::Allocations(records) => records,
            _ => &[],
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }
}

impl From<Result<ParseOutcome, ExecutionError>> for RunOutcome {
    fn from(result: Result<ParseOutcome, ExecutionError>) -> Self {
        match result {
            Ok(ParseOutcome::Records(records)) => RunOutcome::Allocations(records),
            Ok(ParseOutcome::NoneFound) => RunOutcome::NoneFound,
            Err(ExecutionError::Cancelled) => RunOutcome::Cancelled,
            Err(e) => RunOutcome::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub key: BenchmarkKey,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
}

/// Tally of a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub with_allocations: usize,
    pub none_found: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &RunOutcome) {
        self.total += 1;
        match outcome {
            RunOutcome::Allocations(_) => self.with_allocations += 1,
            RunOutcome::NoneFound => self.none_found += 1,
            RunOutcome::Failed(_) => self.failed += 1,
            RunOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Everything a run needs to know about its benchmark, resolved from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    pub key: BenchmarkKey,
    pub module_path: String,
    pub module_root: PathBuf,
}

pub struct Coordinator<T: Toolchain> {
    toolchain: Arc<T>,
    cache: Arc<StructureCache>,
    goroot: Option<PathBuf>,
    artifact_dir: PathBuf,
    jobs: usize,
}

impl<T: Toolchain> Coordinator<T> {
    pub fn new(toolchain: Arc<T>, cache: Arc<StructureCache>) -> Self {
        Self {
            toolchain,
            cache,
            goroot: None,
            artifact_dir: std::env::temp_dir(),
            jobs: DEFAULT_JOBS,
        }
    }

    /// Clamp `jobs` to `1..=MAX_JOBS`.
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.clamp(1, MAX_JOBS);
        self
    }

    #[must_use]
    pub fn with_goroot(mut self, goroot: Option<PathBuf>) -> Self {
        self.goroot = goroot;
        self
    }

    #[must_use]
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    #[must_use]
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Look up the module owning `key`.
    ///
    /// # Errors
    /// Any [`CacheError`] from the lookup; a benchmark whose package has no
    /// module is reported as `CacheError::OrphanPackage`.
    pub fn resolve(&self, key: &BenchmarkKey) -> Result<RunTarget, CacheError> {
        self.cache.find_benchmark(key)?;
        let (package_id, _) = self
            .cache
            .package_of(key)
            .ok_or_else(|| CacheError::NotFound(key.clone()))?;
        let module = self
            .cache
            .module_of(package_id)
            .ok_or_else(|| CacheError::OrphanPackage(key.package_dir.clone()))?;
        Ok(RunTarget { key: key.clone(), module_path: module.path, module_root: module.root })
    }

    /// Profile one benchmark and parse its allocation listing.
    pub async fn run_benchmark(&self, key: &BenchmarkKey, cancel: &CancellationToken) -> RunReport {
        let started = Instant::now();
        let outcome = match self.resolve(key) {
            Ok(target) => RunOutcome::from(self.execute(&target, cancel).await),
            Err(e) => RunOutcome::Failed(e.to_string()),
        };

        if !matches!(outcome, RunOutcome::Cancelled) {
            if let Err(e) = self.cache.mark_run(key) {
                debug!("run state not recorded for {key}: {e}");
            }
        }

        let elapsed = started.elapsed();
        debug!("run {key} finished in {elapsed:?}: {}", outcome_label(&outcome));
        RunReport { key: key.clone(), outcome, elapsed }
    }

    async fn execute(
        &self,
        target: &RunTarget,
        cancel: &CancellationToken,
    ) -> Result<ParseOutcome, ExecutionError> {
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let mut artifacts = ProfileArtifacts::allocate(&self.artifact_dir);
        let request = artifacts.request(&target.key.package_dir, &target.key.name);

        self.toolchain
            .record_profile(request, cancel)
            .await
            .map_err(|e| toolchain_failure(e, ExecutionError::Benchmark))?;

        let scope = module_scope_pattern(&target.module_path);
        let mut parser = ListingParser::new(
            SourceScope::new(target.module_root.clone()).with_goroot(self.goroot.clone()),
        );
        let exit = self
            .toolchain
            .stream_listing(request, &scope, &mut |line: &str| parser.feed_line(line), cancel)
            .await
            .map_err(|e| toolchain_failure(e, ExecutionError::Listing))?;

        let outcome = parser.finish(&exit)?;
        artifacts.cleanup();
        Ok(outcome)
    }

    /// Run every benchmark in `targets` with at most `jobs` in flight.
    ///
    /// Reports are handed to `on_result` in completion order. Once `cancel`
    /// fires, runs not yet admitted report `Cancelled` without starting and
    /// in-flight runs kill their processes and return.
    pub async fn run_all<F>(
        self: &Arc<Self>,
        targets: Vec<BenchmarkKey>,
        cancel: &CancellationToken,
        mut on_result: F,
    ) -> BatchSummary
    where
        F: FnMut(RunReport) + Send,
    {
        info!("running {} benchmark(s), {} at a time", targets.len(), self.jobs);
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let mut tasks = JoinSet::new();

        for key in targets {
            let coordinator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    return RunReport { key, outcome: RunOutcome::Cancelled, elapsed: Duration::ZERO };
                };
                coordinator.run_benchmark(&key, &cancel).await
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    summary.record(&report.outcome);
                    on_result(report);
                }
                Err(e) => warn!("benchmark task failed: {e}"),
            }
        }

        info!(
            "batch done: {} with allocations, {} without, {} failed, {} cancelled",
            summary.with_allocations, summary.none_found, summary.failed, summary.cancelled
        );
        summary
    }

    #[must_use]
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }
}

fn toolchain_failure(
    error: ToolchainError,
    wrap: fn(ToolchainError) -> ExecutionError,
) -> ExecutionError {
    if error.is_cancelled() {
        ExecutionError::Cancelled
    } else {
        wrap(error)
    }
}

fn outcome_label(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Allocations(records) => format!("{} allocation site(s)", records.len()),
        RunOutcome::NoneFound => "no allocations".to_string(),
        RunOutcome::Failed(message) => format!("failed: {message}"),
        RunOutcome::Cancelled => "cancelled".to_string(),
    }
}
