//! Interactive session: the async side of the TUI.
//!
//! The TUI thread sends [`Command`]s; the session turns them into discovery
//! passes and benchmark runs on the tokio runtime and reports progress back
//! as [`SessionEvent`]s over a crossbeam channel. Structure changes are not
//! sent as events; the TUI watches the cache generation instead.
//!
//! All work started by the session shares one [`CancellationToken`]. Cancel
//! and refresh fire it and install a fresh one, so later commands are never
//! born cancelled.

use crossbeam_channel::Sender;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::cache::StructureCache;
use crate::discovery::{DiscoveryEngine, DiscoverySummary};
use crate::domain::{BenchmarkKey, DiscoveryError};
use crate::execution::{BatchSummary, Coordinator, RunReport};
use crate::toolchain::Toolchain;

/// Requests from the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Clear the cache and discover again
    Refresh,
    Run(BenchmarkKey),
    RunAll,
    /// Stop all current work
    Cancel,
    Quit,
}

/// Progress reported to the UI.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A refresh started; run results from before are stale
    Refreshing,
    DiscoveryFinished(Result<DiscoverySummary, String>),
    RunStarted(BenchmarkKey),
    RunFinished(RunReport),
    BatchFinished(BatchSummary),
    /// Work was cancelled on request
    Cancelled,
}

pub struct Session<T: Toolchain> {
    roots: Arc<[PathBuf]>,
    cache: Arc<StructureCache>,
    discovery: Arc<DiscoveryEngine<T>>,
    coordinator: Arc<Coordinator<T>>,
    cancel: CancellationToken,
    events: Sender<SessionEvent>,
}

impl<T: Toolchain> Session<T> {
    pub fn new(
        roots: Vec<PathBuf>,
        discovery: DiscoveryEngine<T>,
        coordinator: Coordinator<T>,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            roots: roots.into(),
            cache: Arc::clone(discovery.cache()),
            discovery: Arc::new(discovery),
            coordinator: Arc::new(coordinator),
            cancel: CancellationToken::new(),
            events,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<StructureCache> {
        &self.cache
    }

    fn emit(&self, event: SessionEvent) {
        // The UI may already be gone during shutdown
        let _ = self.events.send(event);
    }

    /// Cancel every in-flight task and start a fresh scope.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }

    /// Discard the current structure and rediscover every root.
    pub fn refresh(&mut self) {
        self.cancel();
        self.emit(SessionEvent::Refreshing);

        let discovery = Arc::clone(&self.discovery);
        let roots = Arc::clone(&self.roots);
        let cancel = self.cancel.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match discovery.discover(&roots, &cancel).await {
                Ok(summary) => Ok(summary),
                Err(DiscoveryError::Cancelled | DiscoveryError::Superseded) => {
                    debug!("discovery pass stopped early");
                    return;
                }
                Err(e) => {
                    warn!("discovery failed: {e}");
                    Err(e.to_string())
                }
            };
            let _ = events.send(SessionEvent::DiscoveryFinished(result));
        });
    }

    /// Profile one benchmark in the background.
    pub fn run(&self, key: BenchmarkKey) {
        self.emit(SessionEvent::RunStarted(key.clone()));
        let coordinator = Arc::clone(&self.coordinator);
        let cancel = self.cancel.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let report = coordinator.run_benchmark(&key, &cancel).await;
            let _ = events.send(SessionEvent::RunFinished(report));
        });
    }

    /// Profile every cached benchmark, `jobs` at a time.
    pub fn run_all(&self) {
        let targets = self.cache.run_targets();
        if targets.is_empty() {
            info!("nothing to run");
            return;
        }
        for key in &targets {
            self.emit(SessionEvent::RunStarted(key.clone()));
        }

        let coordinator = Arc::clone(&self.coordinator);
        let cancel = self.cancel.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let sink = events.clone();
            let summary = coordinator
                .run_all(targets, &cancel, move |report| {
                    let _ = sink.send(SessionEvent::RunFinished(report));
                })
                .await;
            let _ = events.send(SessionEvent::BatchFinished(summary));
        });
    }

    /// Serve UI commands until `Quit` or until the UI hangs up.
    ///
    /// Starts with a discovery pass. Outstanding work is cancelled on exit.
    pub async fn serve(mut self, mut commands: UnboundedReceiver<Command>) {
        self.refresh();
        while let Some(command) = commands.recv().await {
            debug!("session command: {command:?}");
            match command {
                Command::Refresh => self.refresh(),
                Command::Run(key) => self.run(key),
                Command::RunAll => self.run_all(),
                Command::Cancel => {
                    self.cancel();
                    self.emit(SessionEvent::Cancelled);
                }
                Command::Quit => break,
            }
        }
        self.cancel.cancel();
    }
}
