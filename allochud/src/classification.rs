//! Source origin classification for distinguishing user code from libraries.
//!
//! pprof listings mix the module's own functions with the Go standard library,
//! the module cache and vendored copies of dependencies. Only the first kind
//! is worth showing as an allocation hotspot, so the listing parser asks a
//! [`SourceScope`] about every routine before keeping any of its lines.
//!
//! # Classification Strategy
//!
//! 1. **GOROOT** - files under the toolchain's root are standard library
//! 2. **Module cache** - `/pkg/mod/` paths are third-party dependencies
//! 3. **Module root** - files inside the module are user code, unless they sit
//!    below a `vendor/` directory
//! 4. **Function name** - fallback for files outside every known root:
//!    unqualified packages such as `runtime.` or `strings.` are standard library

use std::path::{Component, Path, PathBuf};

/// Where a source file comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileOrigin {
    /// File inside the analyzed module's own tree
    UserCode,
    /// Go standard library or runtime
    StdLib,
    /// Vendored dependency inside the module tree
    Vendored,
    /// Dependency from the module cache
    ThirdParty,
    /// Could not attribute the file to anything known
    #[default]
    Unknown,
}

impl FileOrigin {
    /// Returns true if this file belongs to the user's module.
    #[must_use]
    pub fn is_user_code(&self) -> bool {
        matches!(self, FileOrigin::UserCode)
    }
}

/// Module cache marker in dependency paths (`$GOPATH/pkg/mod/...`)
const MODULE_CACHE_MARKER: &str = "/pkg/mod/";

/// Directory name Go uses for vendored dependencies
const VENDOR_DIR: &str = "vendor";

/// The tree of files considered user-owned for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceScope {
    module_root: PathBuf,
    goroot: Option<PathBuf>,
}

impl SourceScope {
    pub fn new(module_root: impl Into<PathBuf>) -> Self {
        Self { module_root: module_root.into(), goroot: None }
    }

    #[must_use]
    pub fn with_goroot(mut self, goroot: Option<PathBuf>) -> Self {
        self.goroot = goroot;
        self
    }

    #[must_use]
    pub fn module_root(&self) -> &Path {
        &self.module_root
    }

    /// Classify the file a routine lives in.
    ///
    /// `function` is the fully qualified routine name from the listing and is
    /// only consulted when the path alone is inconclusive.
    #[must_use]
    pub fn classify(&self, function: &str, file: &Path) -> FileOrigin {
        if let Some(goroot) = &self.goroot {
            if file.starts_with(goroot) {
                return FileOrigin::StdLib;
            }
        }

        if file.to_string_lossy().contains(MODULE_CACHE_MARKER) {
            return FileOrigin::ThirdParty;
        }

        if let Ok(relative) = file.strip_prefix(&self.module_root) {
            let vendored = relative
                .components()
                .any(|c| matches!(c, Component::Normal(name) if name == VENDOR_DIR));
            return if vendored { FileOrigin::Vendored } else { FileOrigin::UserCode };
        }

        if is_std_function(function) {
            return FileOrigin::StdLib;
        }

        FileOrigin::Unknown
    }

    #[must_use]
    pub fn is_user_code(&self, function: &str, file: &Path) -> bool {
        self.classify(function, file).is_user_code()
    }
}

/// Standard library import paths have no dot in their first element
/// (`strings`, `runtime`, `internal/abi`), module paths do (`example.com/m`).
/// `main` is the one dotless package that always belongs to the user.
fn is_std_function(function: &str) -> bool {
    let name_start = function.rfind('/').map_or(0, |i| i + 1);
    let Some(dot) = function[name_start..].find('.') else {
        return false;
    };
    let package = &function[..name_start + dot];
    let first = package.split('/').next().unwrap_or_default();
    first != "main" && !first.contains('.')
}
