//! The structure cache: the single source of truth for discovered modules,
//! packages and benchmarks.
//!
//! Entities live in two arenas (`modules`, `packages`) and refer to each other
//! by index, so back references are plain lookups. Only the discovery engine
//! writes; every writer call carries the [`PassId`] returned by
//! [`StructureCache::begin_refresh`] and writes from a superseded pass are
//! dropped. Readers get clones, either of single entities or of the whole
//! tree via [`StructureCache::snapshot`].
//!
//! Every structural change bumps a generation counter published on a
//! `tokio::sync::watch` channel. Views subscribe to it and rebuild from a
//! fresh snapshot when it moves.

use log::debug;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

use crate::domain::{BenchmarkKey, CacheError, ModuleId, PackageId, SourceLocation};
use crate::toolchain::{ModuleInfo, PackageInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Module path from `go.mod`
    pub path: String,
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub import_path: String,
    pub dir: PathBuf,
    pub module: ModuleId,
    /// Benchmarks in declaration order, never empty
    pub benchmarks: Vec<Benchmark>,
}

impl Package {
    #[must_use]
    pub fn benchmark(&self, name: &str) -> Option<&Benchmark> {
        self.benchmarks.iter().find(|b| b.name == name)
    }

    #[must_use]
    pub fn key(&self, benchmark: &Benchmark) -> BenchmarkKey {
        BenchmarkKey::new(self.dir.clone(), benchmark.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Benchmark {
    pub name: String,
    /// Where `func BenchmarkX(` is declared, when it could be located
    pub location: Option<SourceLocation>,
    /// Set once the benchmark has been profiled in this session
    pub has_run: bool,
}

impl Benchmark {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), location: None, has_run: false }
    }

    #[must_use]
    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }
}

/// Progress of the current discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No pass has completed; an abandoned pass also ends here
    #[default]
    Idle,
    Loading,
    Loaded,
}

/// Token identifying one discovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PassId(u64);

#[derive(Debug, Default)]
struct Inner {
    modules: Vec<Module>,
    packages: Vec<Package>,
    by_dir: HashMap<PathBuf, PackageId>,
    state: LoadState,
    pass: u64,
}

impl Inner {
    fn is_current(&self, pass: PassId) -> bool {
        self.pass == pass.0 && self.state == LoadState::Loading
    }
}

/// Cloned, read-only view of the cache at one generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub modules: Vec<Module>,
    pub packages: Vec<Package>,
    pub state: LoadState,
    pub generation: u64,
}

impl CacheSnapshot {
    /// Packages owned by `module`, in insertion order.
    pub fn packages_of(&self, module: ModuleId) -> impl Iterator<Item = &Package> {
        self.packages.iter().filter(move |p| p.module == module)
    }

    #[must_use]
    pub fn benchmark_count(&self) -> usize {
        self.packages.iter().map(|p| p.benchmarks.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

pub struct StructureCache {
    inner: RwLock<Inner>,
    generation: watch::Sender<u64>,
}

impl Default for StructureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureCache {
    #[must_use]
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self { inner: RwLock::new(Inner::default()), generation }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }

    /// Receiver that observes every structural change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Clear every tier and start a new discovery pass.
    ///
    /// Clearing and the state reset happen under one write lock, so readers
    /// never observe a half-cleared cache. Any earlier pass is superseded.
    pub fn begin_refresh(&self) -> PassId {
        let pass = {
            let mut inner = self.write();
            inner.modules.clear();
            inner.packages.clear();
            inner.by_dir.clear();
            inner.state = LoadState::Loading;
            inner.pass += 1;
            PassId(inner.pass)
        };
        debug!("cache: begin pass {}", pass.0);
        self.notify();
        pass
    }

    /// Mark `pass` complete. Ignored if the pass was superseded.
    pub fn finish_pass(&self, pass: PassId) {
        let finished = {
            let mut inner = self.write();
            let current = inner.is_current(pass);
            if current {
                inner.state = LoadState::Loaded;
            }
            current
        };
        if finished {
            self.notify();
        }
    }

    /// Give up on `pass` (cancelled or failed). Entries added so far stay
    /// visible until the next refresh.
    pub fn abandon_pass(&self, pass: PassId) {
        let abandoned = {
            let mut inner = self.write();
            let current = inner.is_current(pass);
            if current {
                inner.state = LoadState::Idle;
            }
            current
        };
        if abandoned {
            self.notify();
        }
    }

    #[must_use]
    pub fn state(&self) -> LoadState {
        self.read().state
    }

    /// Add a module discovered by `pass`. `None` if the pass was superseded.
    pub fn add_module(&self, pass: PassId, info: ModuleInfo) -> Option<ModuleId> {
        let id = {
            let mut inner = self.write();
            if !inner.is_current(pass) {
                return None;
            }
            if let Some(existing) = inner.modules.iter().position(|m| m.root == info.dir) {
                return Some(ModuleId(existing));
            }
            inner.modules.push(Module { path: info.path, root: info.dir });
            ModuleId(inner.modules.len() - 1)
        };
        self.notify();
        Some(id)
    }

    /// Add a package together with its benchmarks.
    ///
    /// Packages without benchmarks are not retained (`Ok(None)`), neither are
    /// writes from a superseded pass. A directory already present keeps its
    /// first entry.
    ///
    /// # Errors
    /// `CacheError::OrphanPackage` if `module` does not exist in this pass.
    pub fn add_package(
        &self,
        pass: PassId,
        module: ModuleId,
        info: PackageInfo,
        benchmarks: Vec<Benchmark>,
    ) -> Result<Option<PackageId>, CacheError> {
        let id = {
            let mut inner = self.write();
            if !inner.is_current(pass) || benchmarks.is_empty() {
                return Ok(None);
            }
            if module.0 >= inner.modules.len() {
                return Err(CacheError::OrphanPackage(info.dir));
            }
            if let Some(existing) = inner.by_dir.get(&info.dir) {
                return Ok(Some(*existing));
            }
            let id = PackageId(inner.packages.len());
            inner.by_dir.insert(info.dir.clone(), id);
            inner.packages.push(Package {
                name: info.name,
                import_path: info.import_path,
                dir: info.dir,
                module,
                benchmarks,
            });
            id
        };
        self.notify();
        Ok(Some(id))
    }

    /// Module whose root is `root`.
    #[must_use]
    pub fn find_module(&self, root: &Path) -> Option<(ModuleId, Module)> {
        let inner = self.read();
        inner
            .modules
            .iter()
            .position(|m| m.root == root)
            .map(|i| (ModuleId(i), inner.modules[i].clone()))
    }

    /// Package whose directory is `dir`.
    #[must_use]
    pub fn find_package(&self, dir: &Path) -> Option<(PackageId, Package)> {
        let inner = self.read();
        let id = *inner.by_dir.get(dir)?;
        Some((id, inner.packages[id.0].clone()))
    }

    /// Look a benchmark up by key.
    ///
    /// # Errors
    /// `CacheError::NotYetAvailable` while discovery has not completed,
    /// `CacheError::NotFound` once it has and the key is absent.
    pub fn find_benchmark(&self, key: &BenchmarkKey) -> Result<Benchmark, CacheError> {
        let inner = self.read();
        let found = inner
            .by_dir
            .get(&key.package_dir)
            .and_then(|id| inner.packages[id.0].benchmark(&key.name))
            .cloned();
        match (found, inner.state) {
            (Some(benchmark), _) => Ok(benchmark),
            (None, LoadState::Loaded) => Err(CacheError::NotFound(key.clone())),
            (None, _) => Err(CacheError::NotYetAvailable(key.clone())),
        }
    }

    /// Package owning a benchmark key.
    #[must_use]
    pub fn package_of(&self, key: &BenchmarkKey) -> Option<(PackageId, Package)> {
        self.find_package(&key.package_dir)
    }

    /// Module owning a package.
    #[must_use]
    pub fn module_of(&self, package: PackageId) -> Option<Module> {
        let inner = self.read();
        let module = inner.packages.get(package.0)?.module;
        inner.modules.get(module.0).cloned()
    }

    /// Record that a benchmark was profiled.
    ///
    /// # Errors
    /// Same as [`find_benchmark`](StructureCache::find_benchmark).
    pub fn mark_run(&self, key: &BenchmarkKey) -> Result<(), CacheError> {
        {
            let mut inner = self.write();
            let state = inner.state;
            let benchmark = match inner.by_dir.get(&key.package_dir).copied() {
                Some(id) => inner.packages[id.0].benchmarks.iter_mut().find(|b| b.name == key.name),
                None => None,
            };
            match (benchmark, state) {
                (Some(benchmark), _) => benchmark.has_run = true,
                (None, LoadState::Loaded) => return Err(CacheError::NotFound(key.clone())),
                (None, _) => return Err(CacheError::NotYetAvailable(key.clone())),
            }
        }
        self.notify();
        Ok(())
    }

    /// Every benchmark key in discovery order.
    #[must_use]
    pub fn run_targets(&self) -> Vec<BenchmarkKey> {
        let inner = self.read();
        inner
            .packages
            .iter()
            .flat_map(|p| p.benchmarks.iter().map(|b| p.key(b)))
            .collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        let inner = self.read();
        CacheSnapshot {
            modules: inner.modules.clone(),
            packages: inner.packages.clone(),
            state: inner.state,
            generation: self.generation(),
        }
    }
}
