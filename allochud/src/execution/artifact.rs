//! Temporary files produced by one profiling run.

use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::toolchain::ProfileRequest;

const ARTIFACT_PREFIX: &str = "allochud";

/// Memory profile and compiled test binary of a single run.
///
/// Names combine wall-clock nanoseconds, a random token and the process id,
/// so concurrent runs and concurrent sessions never collide. Both files are
/// removed exactly once: by [`cleanup`](ProfileArtifacts::cleanup) or, on
/// any early exit, when the guard is dropped.
#[derive(Debug)]
pub struct ProfileArtifacts {
    profile: PathBuf,
    binary: PathBuf,
    cleaned: bool,
}

impl ProfileArtifacts {
    /// Reserve unique artifact paths inside `dir`. Nothing is created yet.
    #[must_use]
    pub fn allocate(dir: &Path) -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
        let token: u32 = rand::random();
        let stem = format!("{ARTIFACT_PREFIX}-{nanos}-{token:08x}-{}", std::process::id());
        Self {
            profile: dir.join(format!("{stem}.mprof")),
            binary: dir.join(format!("{stem}.test")),
            cleaned: false,
        }
    }

    #[must_use]
    pub fn profile_path(&self) -> &Path {
        &self.profile
    }

    #[must_use]
    pub fn binary_path(&self) -> &Path {
        &self.binary
    }

    #[must_use]
    pub fn request<'a>(&'a self, package_dir: &'a Path, benchmark: &'a str) -> ProfileRequest<'a> {
        ProfileRequest {
            package_dir,
            benchmark,
            profile_path: &self.profile,
            binary_path: &self.binary,
        }
    }

    /// Remove both files. Returns `true` only for the call that did the work.
    pub fn cleanup(&mut self) -> bool {
        if self.cleaned {
            return false;
        }
        self.cleaned = true;
        remove_if_present(&self.profile);
        remove_if_present(&self.binary);
        true
    }

    #[must_use]
    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }
}

impl Drop for ProfileArtifacts {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => debug!("failed to remove {}: {e}", path.display()),
    }
}
