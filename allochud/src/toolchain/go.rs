//! Go toolchain invocations and their output formats.
//!
//! | Operation          | Command                                                        |
//! |--------------------|----------------------------------------------------------------|
//! | resolve module     | `go list -m -json`                                             |
//! | list packages      | `go list -e -f '{{.Name}}\t{{.ImportPath}}\t{{.Dir}}' ./...`   |
//! | list benchmarks    | `go test -list '^Benchmark[A-Z_][^/]*$' .`                     |
//! | record profile     | `go test -run '^$' -bench '^Name$' -memprofile ... .`          |
//! | render listing     | `go tool pprof -sample_index=alloc_space -list <scope> ...`    |
//!
//! Commands are spawned directly, never through a shell. Benchmark names are
//! regex-escaped and anchored so `BenchmarkX` never selects `BenchmarkXY`.

use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

use super::process::{self, CommandOutput, CommandSpec};
use super::{ModuleInfo, PackageInfo, ProfileRequest, Toolchain};
use crate::domain::ToolchainError;

/// Pattern passed to `go test -list`: the benchmark prefix, an uppercase
/// letter or underscore, and no sub-benchmark separator.
pub const BENCHMARK_PATTERN: &str = "^Benchmark[A-Z_][^/]*$";

/// Diagnostics `go list -m` prints when a directory is not inside a module.
const NOT_A_MODULE_DIAGNOSTICS: &[&str] =
    &["go.mod file not found", "cannot find main module", "not using modules"];

/// Go's own default for `-memprofilerate` is 512 KiB; a finer rate makes
/// per-line attribution useful for short benchmarks.
pub const DEFAULT_MEMPROFILE_RATE: u64 = 4096;

fn benchmark_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(BENCHMARK_PATTERN).expect("valid benchmark pattern"))
}

/// Returns true if `name` is a top-level benchmark function name.
#[must_use]
pub fn is_benchmark_name(name: &str) -> bool {
    benchmark_name_regex().is_match(name)
}

/// Anchored `-bench` expression selecting exactly one benchmark.
#[must_use]
pub fn anchored_bench_pattern(name: &str) -> String {
    format!("^{}$", regex::escape(name))
}

/// `-list` expression restricting pprof to functions of one module.
///
/// Test binaries of a `main` package report their functions as `main.*`, and
/// external test packages carry a `_test` suffix.
#[must_use]
pub fn module_scope_pattern(module_path: &str) -> String {
    format!("^(main|{}(_test)?)[./]", regex::escape(module_path))
}

/// `go` binary plus the profiling knobs shared by every run.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go: PathBuf,
    memprofile_rate: u64,
    benchtime: Option<String>,
}

impl GoToolchain {
    pub fn new(go: impl Into<PathBuf>) -> Self {
        Self { go: go.into(), memprofile_rate: DEFAULT_MEMPROFILE_RATE, benchtime: None }
    }

    #[must_use]
    pub fn with_memprofile_rate(mut self, rate: u64) -> Self {
        self.memprofile_rate = rate.max(1);
        self
    }

    #[must_use]
    pub fn with_benchtime(mut self, benchtime: Option<String>) -> Self {
        self.benchtime = benchtime;
        self
    }

    #[must_use]
    pub fn module_command(&self, root: &Path) -> CommandSpec {
        CommandSpec::new(&self.go, root).args(["list", "-m", "-json"])
    }

    #[must_use]
    pub fn packages_command(&self, root: &Path) -> CommandSpec {
        CommandSpec::new(&self.go, root).args([
            "list",
            "-e",
            "-f",
            "{{.Name}}\t{{.ImportPath}}\t{{.Dir}}",
            "./...",
        ])
    }

    #[must_use]
    pub fn benchmarks_command(&self, package_dir: &Path) -> CommandSpec {
        CommandSpec::new(&self.go, package_dir).args(["test", "-list", BENCHMARK_PATTERN, "."])
    }

    #[must_use]
    pub fn profile_command(&self, request: &ProfileRequest<'_>) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.go, request.package_dir).args([
            "test".to_string(),
            "-run".to_string(),
            "^$".to_string(),
            "-bench".to_string(),
            anchored_bench_pattern(request.benchmark),
            "-benchmem".to_string(),
            "-memprofile".to_string(),
            request.profile_path.display().to_string(),
            "-memprofilerate".to_string(),
            self.memprofile_rate.to_string(),
            "-o".to_string(),
            request.binary_path.display().to_string(),
        ]);
        if let Some(benchtime) = &self.benchtime {
            spec = spec.arg("-benchtime").arg(benchtime.clone());
        }
        spec.arg(".")
    }

    #[must_use]
    pub fn listing_command(&self, request: &ProfileRequest<'_>, scope: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.go, request.package_dir).args([
            "tool".to_string(),
            "pprof".to_string(),
            "-sample_index=alloc_space".to_string(),
            format!("-list={scope}"),
        ]);
        if request.binary_path.exists() {
            spec = spec.arg(request.binary_path.display().to_string());
        }
        spec.arg(request.profile_path.display().to_string())
    }
}

fn command_failed(spec: &CommandSpec, output: &CommandOutput) -> ToolchainError {
    ToolchainError::CommandFailed {
        command: spec.to_string(),
        status: output.status_label(),
        diagnostics: output.diagnostics(),
    }
}

impl Toolchain for GoToolchain {
    async fn resolve_module(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<ModuleInfo>, ToolchainError> {
        let spec = self.module_command(root);
        let output = process::run(&spec, cancel).await?;
        if !output.success() {
            if NOT_A_MODULE_DIAGNOSTICS.iter().any(|d| output.stderr.contains(d)) {
                return Ok(None);
            }
            return Err(command_failed(&spec, &output));
        }
        parse_module_json(&output.stdout).map_err(|detail| ToolchainError::UnexpectedOutput {
            command: spec.to_string(),
            detail,
        })
    }

    async fn list_packages(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PackageInfo>, ToolchainError> {
        let spec = self.packages_command(root);
        let output = process::run(&spec, cancel).await?;
        if !output.success() {
            return Err(command_failed(&spec, &output));
        }
        Ok(parse_package_lines(&output.stdout))
    }

    async fn list_benchmarks(
        &self,
        package_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ToolchainError> {
        let spec = self.benchmarks_command(package_dir);
        let output = process::run(&spec, cancel).await?;
        if !output.success() {
            return Err(command_failed(&spec, &output));
        }
        Ok(parse_benchmark_list(&output.stdout))
    }

    async fn record_profile(
        &self,
        request: ProfileRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ToolchainError> {
        let spec = self.profile_command(&request);
        let output = process::run(&spec, cancel).await?;
        if !output.success() {
            return Err(command_failed(&spec, &output));
        }
        if !request.profile_path.exists() {
            return Err(ToolchainError::UnexpectedOutput {
                command: spec.to_string(),
                detail: format!("no profile written to {}", request.profile_path.display()),
            });
        }
        debug!("profile written: {}", request.profile_path.display());
        Ok(())
    }

    async fn stream_listing(
        &self,
        request: ProfileRequest<'_>,
        scope: &str,
        on_line: &mut (dyn FnMut(&str) + Send),
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ToolchainError> {
        let spec = self.listing_command(&request, scope);
        process::run_streaming(&spec, cancel, on_line).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GoModule {
    path: String,
    dir: Option<PathBuf>,
}

/// Parse `go list -m -json`. In a `go.work` workspace the command prints one
/// object per module; the first module with a directory wins.
fn parse_module_json(stdout: &str) -> Result<Option<ModuleInfo>, String> {
    let stream = serde_json::Deserializer::from_str(stdout).into_iter::<GoModule>();
    for module in stream {
        let module = module.map_err(|e| e.to_string())?;
        if let Some(dir) = module.dir {
            return Ok(Some(ModuleInfo { path: module.path, dir }));
        }
    }
    Ok(None)
}

/// Parse `go list -f '{{.Name}}\t{{.ImportPath}}\t{{.Dir}}'` output.
fn parse_package_lines(stdout: &str) -> Vec<PackageInfo> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, '\t');
            let name = fields.next()?.trim();
            let import_path = fields.next()?.trim();
            let dir = fields.next()?.trim();
            if name.is_empty() || dir.is_empty() {
                return None;
            }
            Some(PackageInfo {
                name: name.to_string(),
                import_path: import_path.to_string(),
                dir: PathBuf::from(dir),
            })
        })
        .collect()
}

/// Parse `go test -list` output: one name per line followed by a summary
/// line (`ok  pkg 0.01s`, `?  pkg [no test files]`) that is skipped.
fn parse_benchmark_list(stdout: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in stdout.lines().map(str::trim) {
        if is_benchmark_name(line) && !names.iter().any(|n| n == line) {
            names.push(line.to_string());
        }
    }
    names
}
