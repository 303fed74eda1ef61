//! External toolchain access
//!
//! - `process`: spawning, streaming and cancelling child processes
//! - `go`: the `go list` / `go test` / `go tool pprof` invocations
//!
//! Discovery and execution only talk to the toolchain through the
//! [`Toolchain`] trait, so the engine can be driven by a scripted toolchain
//! in tests.

pub mod go;
pub mod process;

use std::future::Future;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::domain::ToolchainError;

pub use go::GoToolchain;
pub use process::{CommandOutput, CommandSpec};

/// A module resolved from a workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Module path from `go.mod` (e.g. `example.com/app`)
    pub path: String,
    /// Absolute directory containing `go.mod`
    pub dir: PathBuf,
}

/// A package found under a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub name: String,
    pub import_path: String,
    /// Absolute package directory
    pub dir: PathBuf,
}

/// Everything needed to profile exactly one benchmark.
#[derive(Debug, Clone, Copy)]
pub struct ProfileRequest<'a> {
    pub package_dir: &'a Path,
    pub benchmark: &'a str,
    /// Where the memory profile must be written
    pub profile_path: &'a Path,
    /// Where the compiled test binary must be written
    pub binary_path: &'a Path,
}

/// Operations the engine needs from a Go toolchain.
///
/// All operations take the cancellation token of the current work scope and
/// must return `ToolchainError::Cancelled` promptly once it fires.
pub trait Toolchain: Send + Sync + 'static {
    /// Resolve the module rooted at `root`. `Ok(None)` when `root` is not a module.
    fn resolve_module(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<ModuleInfo>, ToolchainError>> + Send;

    /// List every package of the module rooted at `root`.
    fn list_packages(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<PackageInfo>, ToolchainError>> + Send;

    /// List benchmark names declared in one package, in declaration order.
    fn list_benchmarks(
        &self,
        package_dir: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<String>, ToolchainError>> + Send;

    /// Run one benchmark with memory profiling, writing the profile to
    /// `request.profile_path`.
    fn record_profile(
        &self,
        request: ProfileRequest<'_>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), ToolchainError>> + Send;

    /// Render a profile as an annotated source listing restricted to
    /// functions matching `scope`, streaming each stdout line to `on_line`.
    ///
    /// The returned output carries the exit code and stderr so the caller can
    /// tell "no matching routines" apart from a failure.
    fn stream_listing(
        &self,
        request: ProfileRequest<'_>,
        scope: &str,
        on_line: &mut (dyn FnMut(&str) + Send),
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<CommandOutput, ToolchainError>> + Send;
}
