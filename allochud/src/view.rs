//! Display hierarchy derived from the cache and the session's run results.
//!
//! [`build_tree`] is a pure function of a [`CacheSnapshot`] and
//! [`RunResults`]. The tree is rebuilt whenever either changes and is never
//! written back anywhere; hosts keep only presentation state (selection,
//! expansion) keyed by [`NodeId`].
//!
//! ```text
//! Module example.com/app
//! └── Package app
//!     ├── BenchmarkSliceAppend          ran
//!     │   ├── 3.77GB  a_test.go:10      s := build()
//!     │   └── 1.20MB  a_test.go:31      buf := make([]byte, n)
//!     └── BenchmarkMapAccess
//!         └── (error) Benchmark run failed: ...
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::cache::{CacheSnapshot, LoadState};
use crate::domain::{AllocationRecord, BenchmarkKey, SourceLocation};
use crate::execution::{RunOutcome, RunReport};

/// Progress of one benchmark in this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Running,
    Finished(RunOutcome),
}

/// Ephemeral results of the runs started in this session.
///
/// Allocation records live here, never in the cache. Cleared on refresh.
#[derive(Debug, Clone, Default)]
pub struct RunResults {
    runs: HashMap<BenchmarkKey, RunState>,
}

impl RunResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, key: BenchmarkKey) {
        self.runs.insert(key, RunState::Running);
    }

    pub fn finish(&mut self, report: RunReport) {
        self.runs.insert(report.key, RunState::Finished(report.outcome));
    }

    #[must_use]
    pub fn get(&self, key: &BenchmarkKey) -> Option<&RunState> {
        self.runs.get(key)
    }

    #[must_use]
    pub fn is_running(&self, key: &BenchmarkKey) -> bool {
        matches!(self.runs.get(key), Some(RunState::Running))
    }

    #[must_use]
    pub fn running_count(&self) -> usize {
        self.runs.values().filter(|s| matches!(s, RunState::Running)).count()
    }

    /// Drop every result; runs still marked running are discarded too.
    pub fn clear(&mut self) {
        self.runs.clear();
    }

    /// Mark every running benchmark as cancelled.
    pub fn cancel_running(&mut self) {
        for state in self.runs.values_mut() {
            if matches!(state, RunState::Running) {
                *state = RunState::Finished(RunOutcome::Cancelled);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// What a benchmark node shows next to its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkStatus {
    NotRun,
    Running,
    Ran,
}

/// Stable identity of an expandable node across rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    Module(PathBuf),
    Package(PathBuf),
    Benchmark(BenchmarkKey),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Module {
        path: String,
        root: PathBuf,
        children: Vec<TreeNode>,
    },
    Package {
        name: String,
        import_path: String,
        dir: PathBuf,
        children: Vec<TreeNode>,
    },
    Benchmark {
        key: BenchmarkKey,
        location: Option<SourceLocation>,
        status: BenchmarkStatus,
        children: Vec<TreeNode>,
    },
    Information {
        message: String,
        severity: Severity,
    },
    Allocation(AllocationRecord),
}

impl TreeNode {
    fn info(message: impl Into<String>) -> Self {
        TreeNode::Information { message: message.into(), severity: Severity::Info }
    }

    fn error(message: impl Into<String>) -> Self {
        TreeNode::Information { message: message.into(), severity: Severity::Error }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            TreeNode::Module { path, .. } => path.clone(),
            TreeNode::Package { name, .. } => name.clone(),
            TreeNode::Benchmark { key, .. } => key.name.clone(),
            TreeNode::Information { message, .. } => message.clone(),
            TreeNode::Allocation(record) => {
                format!("{} {}:{}", record.flat, record.file_name(), record.line)
            }
        }
    }

    /// Secondary text shown dimmed after the label.
    #[must_use]
    pub fn description(&self) -> Option<String> {
        match self {
            TreeNode::Module { root, .. } => Some(root.display().to_string()),
            TreeNode::Package { import_path, .. } => Some(import_path.clone()),
            TreeNode::Benchmark { status, .. } => match status {
                BenchmarkStatus::NotRun => None,
                BenchmarkStatus::Running => Some("running".to_string()),
                BenchmarkStatus::Ran => Some("ran".to_string()),
            },
            TreeNode::Information { .. } => None,
            TreeNode::Allocation(record) => Some(record.source.clone()),
        }
    }

    #[must_use]
    pub fn children(&self) -> &[TreeNode] {
        match self {
            TreeNode::Module { children, .. }
            | TreeNode::Package { children, .. }
            | TreeNode::Benchmark { children, .. } => children,
            TreeNode::Information { .. } | TreeNode::Allocation(_) => &[],
        }
    }

    /// Identity for expansion state; leaves have none.
    #[must_use]
    pub fn id(&self) -> Option<NodeId> {
        match self {
            TreeNode::Module { root, .. } => Some(NodeId::Module(root.clone())),
            TreeNode::Package { dir, .. } => Some(NodeId::Package(dir.clone())),
            TreeNode::Benchmark { key, .. } => Some(NodeId::Benchmark(key.clone())),
            TreeNode::Information { .. } | TreeNode::Allocation(_) => None,
        }
    }

    /// Where "open in editor" goes for this node.
    #[must_use]
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            TreeNode::Benchmark { location, .. } => location.clone(),
            TreeNode::Allocation(record) => Some(record.location()),
            _ => None,
        }
    }

    #[must_use]
    pub fn benchmark_key(&self) -> Option<&BenchmarkKey> {
        match self {
            TreeNode::Benchmark { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Project the cache and the run results into display nodes.
#[must_use]
pub fn build_tree(snapshot: &CacheSnapshot, results: &RunResults) -> Vec<TreeNode> {
    if snapshot.packages.is_empty() {
        return match snapshot.state {
            LoadState::Loading => vec![TreeNode::info("Discovering benchmarks...")],
            LoadState::Loaded => vec![TreeNode::info("No benchmarks found")],
            LoadState::Idle => Vec::new(),
        };
    }

    snapshot
        .modules
        .iter()
        .enumerate()
        .filter_map(|(index, module)| {
            let packages: Vec<TreeNode> = snapshot
                .packages_of(crate::domain::ModuleId(index))
                .map(|package| TreeNode::Package {
                    name: package.name.clone(),
                    import_path: package.import_path.clone(),
                    dir: package.dir.clone(),
                    children: package
                        .benchmarks
                        .iter()
                        .map(|benchmark| {
                            let key = package.key(benchmark);
                            let state = results.get(&key);
                            let status = match state {
                                Some(RunState::Running) => BenchmarkStatus::Running,
                                _ if benchmark.has_run => BenchmarkStatus::Ran,
                                _ => BenchmarkStatus::NotRun,
                            };
                            TreeNode::Benchmark {
                                children: result_nodes(state),
                                key,
                                location: benchmark.location.clone(),
                                status,
                            }
                        })
                        .collect(),
                })
                .collect();
            (!packages.is_empty()).then(|| TreeNode::Module {
                path: module.path.clone(),
                root: module.root.clone(),
                children: packages,
            })
        })
        .collect()
}

fn result_nodes(state: Option<&RunState>) -> Vec<TreeNode> {
    match state {
        None => Vec::new(),
        Some(RunState::Running) => vec![TreeNode::info("Running...")],
        Some(RunState::Finished(outcome)) => match outcome {
            RunOutcome::Allocations(records) => {
                records.iter().cloned().map(TreeNode::Allocation).collect()
            }
            RunOutcome::NoneFound => vec![TreeNode::info("No allocations in user code")],
            RunOutcome::Failed(message) => vec![TreeNode::error(message.clone())],
            RunOutcome::Cancelled => vec![TreeNode::info("Cancelled")],
        },
    }
}

/// Render nodes as an indented plain-text tree (headless mode).
#[must_use]
pub fn render_text(nodes: &[TreeNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(&mut out, node, 0);
    }
    out
}

fn render_node(out: &mut String, node: &TreeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let marker = match node {
        TreeNode::Information { severity: Severity::Error, .. } => "error: ",
        _ => "",
    };
    let _ = write!(out, "{indent}{marker}{}", node.label());
    if let Some(description) = node.description() {
        let _ = write!(out, "  {description}");
    }
    out.push('\n');
    for child in node.children() {
        render_node(out, child, depth + 1);
    }
}
