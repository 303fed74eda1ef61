//! Pre-flight checks for allochud
//!
//! Validates the environment before any discovery starts: the workspace
//! roots must be directories and the `go` binary must run. Failures come
//! back as clear, actionable messages.

use anyhow::{bail, Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;

/// What the Go toolchain reported about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoEnvironment {
    /// Standard library root, used to classify listing files
    pub goroot: Option<PathBuf>,
    /// e.g. `go1.24.1`
    pub version: String,
}

/// Check that every workspace root exists and is a directory
pub fn check_roots(roots: &[PathBuf]) -> Result<()> {
    for root in roots {
        if !root.exists() {
            bail!(
                "Workspace root not found: {}\n\n\
                 Pass the directory that contains go.mod; give one root per module.",
                root.display()
            );
        }
        if !root.is_dir() {
            bail!("Not a directory: {}\n\nWorkspace roots must be directories.", root.display());
        }
    }
    Ok(())
}

/// Run `go env GOROOT GOVERSION` to make sure the toolchain is usable
pub fn probe_go(go: &Path) -> Result<GoEnvironment> {
    let output = Command::new(go)
        .args(["env", "GOROOT", "GOVERSION"])
        .output()
        .with_context(|| {
            format!(
                "Cannot run `{}`\n\n\
                 Install Go from https://go.dev/dl/ or point --go / ALLOCHUD_GO at the binary.",
                go.display()
            )
        })?;

    if !output.status.success() {
        bail!(
            "`{} env` failed ({}):\n{}",
            go.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let environment = parse_go_env(&String::from_utf8_lossy(&output.stdout));
    debug!("go environment: {environment:?}");
    Ok(environment)
}

fn parse_go_env(stdout: &str) -> GoEnvironment {
    let mut lines = stdout.lines().map(str::trim);
    let goroot = lines.next().filter(|l| !l.is_empty()).map(PathBuf::from);
    let version = lines.next().unwrap_or_default().to_string();
    GoEnvironment { goroot, version }
}
