//! Structured error types for allochud
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

use super::types::BenchmarkKey;

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("Failed to spawn `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {diagnostics}")]
    CommandFailed { command: String, status: String, diagnostics: String },

    #[error("`{0}` was cancelled")]
    Cancelled(String),

    #[error("Unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ToolchainError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolchainError::Cancelled(_))
    }
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to list packages under {root}: {source}")]
    PackageListing {
        root: PathBuf,
        #[source]
        source: ToolchainError,
    },

    #[error("Discovery was cancelled")]
    Cancelled,

    #[error("Discovery pass was superseded by a newer refresh")]
    Superseded,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CacheError {
    #[error("Benchmark {0} not found in a fully loaded cache")]
    NotFound(BenchmarkKey),

    #[error("Benchmark {0} is not available yet, discovery still in progress")]
    NotYetAvailable(BenchmarkKey),

    #[error("No module owns package directory {0}")]
    OrphanPackage(PathBuf),
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("pprof failed ({status}): {diagnostics}")]
    ToolFailed { status: String, diagnostics: String },

    #[error("Unsupported listing format (v{version}) at line {line_number}: {line:?}")]
    UnsupportedFormat { version: u32, line_number: usize, line: String },
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Benchmark run failed: {0}")]
    Benchmark(ToolchainError),

    #[error("Profile listing failed: {0}")]
    Listing(ToolchainError),

    #[error("Profile parse failed: {0}")]
    Profile(#[from] ProfileError),

    #[error("Run was cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to write export file: {0}")]
    WriteFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum NavigationError {
    #[error("Line numbers are 1-based, got {0}")]
    InvalidLine(u32),

    #[error("No editor configured (set $VISUAL or $EDITOR)")]
    NoEditor,

    #[error("Failed to launch editor `{editor}`: {source}")]
    LaunchFailed {
        editor: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Editor `{editor}` exited with {status}")]
    EditorFailed { editor: String, status: String },
}
