//! Scripted toolchain shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use allochud::domain::ToolchainError;
use allochud::toolchain::{CommandOutput, ModuleInfo, PackageInfo, ProfileRequest, Toolchain};

/// A fake `go` answering from tables set up by the test.
#[derive(Default)]
pub struct ScriptedToolchain {
    modules: HashMap<PathBuf, ModuleInfo>,
    packages: HashMap<PathBuf, Vec<PackageInfo>>,
    benchmarks: HashMap<PathBuf, Vec<String>>,
    failing_probes: HashSet<PathBuf>,
    listings: HashMap<String, String>,
    failing_runs: HashSet<String>,
    run_delay: Duration,
    probe_delay: Duration,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    profiles_recorded: AtomicUsize,
    bench_patterns: Mutex<Vec<String>>,
}

impl ScriptedToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, root: &Path, path: &str) -> Self {
        self.modules
            .insert(root.to_path_buf(), ModuleInfo { path: path.to_string(), dir: root.to_path_buf() });
        self
    }

    pub fn with_package(mut self, module_root: &Path, dir: &Path, import_path: &str, benchmarks: &[&str]) -> Self {
        let name = import_path.rsplit('/').next().unwrap_or(import_path).to_string();
        self.packages.entry(module_root.to_path_buf()).or_default().push(PackageInfo {
            name,
            import_path: import_path.to_string(),
            dir: dir.to_path_buf(),
        });
        self.benchmarks
            .insert(dir.to_path_buf(), benchmarks.iter().map(ToString::to_string).collect());
        self
    }

    /// `go test -list` fails for this package
    pub fn with_failing_probe(mut self, dir: &Path) -> Self {
        self.failing_probes.insert(dir.to_path_buf());
        self
    }

    /// pprof output for a benchmark; benchmarks without one get "no matches"
    pub fn with_listing(mut self, benchmark: &str, listing: &str) -> Self {
        self.listings.insert(benchmark.to_string(), listing.to_string());
        self
    }

    pub fn with_failing_run(mut self, benchmark: &str) -> Self {
        self.failing_runs.insert(benchmark.to_string());
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn profiles_recorded(&self) -> usize {
        self.profiles_recorded.load(Ordering::SeqCst)
    }

    /// Anchored `-bench` expressions the runs would have used
    pub fn bench_patterns(&self) -> Vec<String> {
        self.bench_patterns.lock().unwrap().clone()
    }

    async fn pause(delay: Duration, cancel: &CancellationToken, what: &str) -> Result<(), ToolchainError> {
        if delay.is_zero() {
            return if cancel.is_cancelled() { Err(ToolchainError::Cancelled(what.to_string())) } else { Ok(()) };
        }
        tokio::select! {
            () = cancel.cancelled() => Err(ToolchainError::Cancelled(what.to_string())),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl Toolchain for ScriptedToolchain {
    async fn resolve_module(
        &self,
        root: &Path,
        _cancel: &CancellationToken,
    ) -> Result<Option<ModuleInfo>, ToolchainError> {
        Ok(self.modules.get(root).cloned())
    }

    async fn list_packages(
        &self,
        root: &Path,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PackageInfo>, ToolchainError> {
        Ok(self.packages.get(root).cloned().unwrap_or_default())
    }

    async fn list_benchmarks(
        &self,
        package_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ToolchainError> {
        Self::pause(self.probe_delay, cancel, "go test -list").await?;
        if self.failing_probes.contains(package_dir) {
            return Err(ToolchainError::CommandFailed {
                command: "go test -list".to_string(),
                status: "exit status 1".to_string(),
                diagnostics: "build failed".to_string(),
            });
        }
        Ok(self.benchmarks.get(package_dir).cloned().unwrap_or_default())
    }

    async fn record_profile(
        &self,
        request: ProfileRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolchainError> {
        self.bench_patterns
            .lock()
            .unwrap()
            .push(allochud::toolchain::go::anchored_bench_pattern(request.benchmark));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Artifacts exist while the "benchmark" runs
        std::fs::write(request.binary_path, b"test binary")?;
        std::fs::write(request.profile_path, b"memory profile")?;

        let result = Self::pause(self.run_delay, cancel, "go test -bench").await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;

        if self.failing_runs.contains(request.benchmark) {
            return Err(ToolchainError::CommandFailed {
                command: "go test -bench".to_string(),
                status: "exit status 1".to_string(),
                diagnostics: "panic: boom".to_string(),
            });
        }
        self.profiles_recorded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stream_listing(
        &self,
        request: ProfileRequest<'_>,
        scope: &str,
        on_line: &mut (dyn FnMut(&str) + Send),
        _cancel: &CancellationToken,
    ) -> Result<CommandOutput, ToolchainError> {
        match self.listings.get(request.benchmark) {
            Some(listing) => {
                for line in listing.lines() {
                    on_line(line);
                }
                Ok(CommandOutput { code: Some(0), ..CommandOutput::default() })
            }
            None => Ok(CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: format!("no matches found for regexp: {scope}"),
            }),
        }
    }
}

/// Listing with one allocating line of user code under `root`.
pub fn listing_for(module_path: &str, root: &Path, function: &str, line: u32) -> String {
    format!(
        "Total: 1.50MB\n\
         ROUTINE ======================== {module_path}.{function} in {file}\n\
         \x20   1.50MB     1.50MB (flat, cum)   100% of Total\n\
         \x20        .          .     {decl}:func {function}() []byte {{\n\
         \x20   1.50MB     1.50MB     {line}:\treturn make([]byte, 1<<20)\n",
        file = root.join("alloc_test.go").display(),
        decl = line - 1,
    )
}

/// Number of entries left in a directory
pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(Iterator::count).unwrap_or_default()
}
