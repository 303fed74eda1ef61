//! Benchmark discovery
//!
//! A discovery pass walks every workspace root through three tiers and
//! writes what it finds into the [`StructureCache`] as soon as it is known:
//!
//! ```text
//! root ──go list -m──▶ module ──go list ./...──▶ packages ──go test -list──▶ benchmarks
//! ```
//!
//! Package probes of one root run concurrently and land in the cache in
//! completion order. A probe that fails is logged and skipped; failing to
//! list a root's packages ends the pass.

pub mod locate;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::{Benchmark, PassId, StructureCache};
use crate::domain::{DiscoveryError, ModuleId, ToolchainError};
use crate::toolchain::{PackageInfo, Toolchain};

/// Package probes in flight per root
pub const DEFAULT_PROBE_CONCURRENCY: usize = 4;

/// What a finished pass found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub modules: usize,
    pub packages: usize,
    pub benchmarks: usize,
    /// Roots that did not resolve to a module
    pub skipped_roots: usize,
    /// Packages whose benchmark listing failed
    pub failed_probes: usize,
}

pub struct DiscoveryEngine<T: Toolchain> {
    toolchain: Arc<T>,
    cache: Arc<StructureCache>,
    probe_concurrency: usize,
}

impl<T: Toolchain> DiscoveryEngine<T> {
    pub fn new(toolchain: Arc<T>, cache: Arc<StructureCache>) -> Self {
        Self { toolchain, cache, probe_concurrency: DEFAULT_PROBE_CONCURRENCY }
    }

    #[must_use]
    pub fn with_probe_concurrency(mut self, limit: usize) -> Self {
        self.probe_concurrency = limit.max(1);
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<StructureCache> {
        &self.cache
    }

    /// Run a full discovery pass over `roots`, replacing the cache contents.
    ///
    /// # Errors
    /// - `DiscoveryError::PackageListing` if a module's packages cannot be listed
    /// - `DiscoveryError::Cancelled` if `cancel` fires during the pass
    /// - `DiscoveryError::Superseded` if another pass started meanwhile
    pub async fn discover(
        &self,
        roots: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<DiscoverySummary, DiscoveryError> {
        let pass = self.cache.begin_refresh();
        info!("discovery: scanning {} workspace root(s)", roots.len());

        let mut summary = DiscoverySummary::default();
        for root in roots {
            if let Err(e) = self.discover_root(pass, root, cancel, &mut summary).await {
                self.cache.abandon_pass(pass);
                return Err(e);
            }
        }

        self.cache.finish_pass(pass);
        info!(
            "discovery: {} module(s), {} package(s), {} benchmark(s)",
            summary.modules, summary.packages, summary.benchmarks
        );
        Ok(summary)
    }

    async fn discover_root(
        &self,
        pass: PassId,
        root: &Path,
        cancel: &CancellationToken,
        summary: &mut DiscoverySummary,
    ) -> Result<(), DiscoveryError> {
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }

        let module = match self.toolchain.resolve_module(root, cancel).await {
            Ok(Some(module)) => module,
            Ok(None) => {
                info!("discovery: {} is not a Go module, skipping", root.display());
                summary.skipped_roots += 1;
                return Ok(());
            }
            Err(e) if e.is_cancelled() => return Err(DiscoveryError::Cancelled),
            Err(e) => {
                info!("discovery: cannot resolve module at {}: {e}", root.display());
                summary.skipped_roots += 1;
                return Ok(());
            }
        };
        let module_dir = module.dir.clone();
        debug!("discovery: module {} at {}", module.path, module_dir.display());

        let module_id = self.cache.add_module(pass, module).ok_or(DiscoveryError::Superseded)?;
        summary.modules += 1;

        let packages = match self.toolchain.list_packages(&module_dir, cancel).await {
            Ok(packages) => packages,
            Err(e) if e.is_cancelled() => return Err(DiscoveryError::Cancelled),
            Err(source) => {
                return Err(DiscoveryError::PackageListing { root: module_dir, source });
            }
        };

        self.probe_packages(pass, module_id, packages, cancel, summary).await
    }

    async fn probe_packages(
        &self,
        pass: PassId,
        module: ModuleId,
        packages: Vec<PackageInfo>,
        cancel: &CancellationToken,
        summary: &mut DiscoverySummary,
    ) -> Result<(), DiscoveryError> {
        let toolchain = &self.toolchain;
        let mut probes = stream::iter(packages)
            .map(|package| async move {
                let result = probe(toolchain.as_ref(), &package, cancel).await;
                (package, result)
            })
            .buffer_unordered(self.probe_concurrency);

        while let Some((package, result)) = probes.next().await {
            let benchmarks = match result {
                Ok(benchmarks) => benchmarks,
                Err(e) if e.is_cancelled() => return Err(DiscoveryError::Cancelled),
                Err(e) => {
                    warn!("discovery: skipping package {}: {e}", package.dir.display());
                    summary.failed_probes += 1;
                    continue;
                }
            };
            if benchmarks.is_empty() {
                continue;
            }

            let count = benchmarks.len();
            let dir = package.dir.clone();
            match self.cache.add_package(pass, module, package, benchmarks) {
                Ok(Some(_)) => {
                    summary.packages += 1;
                    summary.benchmarks += count;
                }
                Ok(None) => return Err(DiscoveryError::Superseded),
                Err(e) => warn!("discovery: dropping {}: {e}", dir.display()),
            }
        }
        Ok(())
    }
}

/// List one package's benchmarks and attach their declaration sites.
async fn probe<T: Toolchain>(
    toolchain: &T,
    package: &PackageInfo,
    cancel: &CancellationToken,
) -> Result<Vec<Benchmark>, ToolchainError> {
    let names = toolchain.list_benchmarks(&package.dir, cancel).await?;
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut locations = locate::benchmark_locations(&package.dir).await.unwrap_or_else(|e| {
        debug!("discovery: cannot scan {}: {e}", package.dir.display());
        Default::default()
    });

    Ok(names
        .into_iter()
        .map(|name| {
            let location = locations.remove(&name);
            Benchmark::new(name).with_location(location)
        })
        .collect())
}
