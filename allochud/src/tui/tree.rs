//! Tree panel - modules, packages, benchmarks and their allocation sites.
//!
//! # Data Flow
//!
//! ```text
//! CacheSnapshot + RunResults → build_tree() → TreeNode[] → TreeView::rebuild() → rows → render()
//! ```
//!
//! The view flattens the visible part of the tree into rows. Expansion state
//! is keyed by [`NodeId`] so it survives rebuilds; modules and packages start
//! expanded, benchmarks start collapsed.
//!
//! # Rendering Pattern
//!
//! ```text
//! ▾ example.com/app  /w/app
//!   ▾ app  example.com/app
//!     ▸ BenchmarkMapAccess
//!     ▾ BenchmarkSliceAppend  ran
//!         3.77GB a_test.go:10  s := build()
//! ```

use std::collections::HashMap;

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use super::theme::{CAUTION_AMBER, CRITICAL_RED, HUD_GREEN, INFO_DIM};
use crate::domain::{BenchmarkKey, SourceLocation};
use crate::view::{BenchmarkStatus, NodeId, Severity, TreeNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Module,
    Package,
    Benchmark(BenchmarkStatus),
    Information(Severity),
    Allocation,
}

/// One visible line of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub depth: usize,
    pub kind: RowKind,
    pub id: Option<NodeId>,
    pub label: String,
    pub description: Option<String>,
    pub location: Option<SourceLocation>,
    pub has_children: bool,
    pub expanded: bool,
}

impl TreeRow {
    #[must_use]
    pub fn benchmark_key(&self) -> Option<&BenchmarkKey> {
        match &self.id {
            Some(NodeId::Benchmark(key)) => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TreeView {
    rows: Vec<TreeRow>,
    expansion: HashMap<NodeId, bool>,
    selected: usize,
}

fn expanded_by_default(id: &NodeId) -> bool {
    !matches!(id, NodeId::Benchmark(_))
}

impl TreeView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rows(&self) -> &[TreeRow] {
        &self.rows
    }

    #[must_use]
    pub fn selected_index(&self) -> usize {
        self.selected
    }

    #[must_use]
    pub fn selected(&self) -> Option<&TreeRow> {
        self.rows.get(self.selected)
    }

    fn is_expanded(&self, id: &NodeId) -> bool {
        self.expansion.get(id).copied().unwrap_or_else(|| expanded_by_default(id))
    }

    /// Re-flatten `nodes`, keeping the selection on the same node when it
    /// still exists.
    pub fn rebuild(&mut self, nodes: &[TreeNode]) {
        let previous = self.selected().map(|row| (row.id.clone(), row.label.clone()));

        let mut rows = Vec::new();
        for node in nodes {
            self.flatten(node, 0, &mut rows);
        }
        self.rows = rows;

        let restored = previous.and_then(|(id, label)| {
            self.rows.iter().position(|row| match &id {
                Some(id) => row.id.as_ref() == Some(id),
                None => row.label == label,
            })
        });
        self.selected = restored.unwrap_or(self.selected).min(self.rows.len().saturating_sub(1));
    }

    fn flatten(&self, node: &TreeNode, depth: usize, rows: &mut Vec<TreeRow>) {
        let id = node.id();
        let expanded = id.as_ref().is_some_and(|id| self.is_expanded(id));
        let kind = match node {
            TreeNode::Module { .. } => RowKind::Module,
            TreeNode::Package { .. } => RowKind::Package,
            TreeNode::Benchmark { status, .. } => RowKind::Benchmark(*status),
            TreeNode::Information { severity, .. } => RowKind::Information(*severity),
            TreeNode::Allocation(_) => RowKind::Allocation,
        };
        rows.push(TreeRow {
            depth,
            kind,
            id,
            label: node.label(),
            description: node.description(),
            location: node.location(),
            has_children: !node.children().is_empty(),
            expanded,
        });
        if expanded {
            for child in node.children() {
                self.flatten(child, depth + 1, rows);
            }
        }
    }

    pub fn scroll_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }

    /// Expand or collapse the selected node. Takes effect on the next rebuild.
    pub fn toggle(&mut self) {
        if let Some(id) = self.selected().and_then(|row| row.id.clone()) {
            let expanded = self.is_expanded(&id);
            self.expansion.insert(id, !expanded);
        }
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        self.expansion.insert(id, expanded);
    }

    /// Collapse the selected node, or move to its parent when it is a leaf
    /// or already collapsed.
    pub fn collapse_or_parent(&mut self) {
        let Some(row) = self.selected() else {
            return;
        };
        if row.expanded {
            if let Some(id) = row.id.clone() {
                self.expansion.insert(id, false);
            }
            return;
        }
        let depth = row.depth;
        if let Some(parent) = self.rows[..self.selected].iter().rposition(|r| r.depth < depth) {
            self.selected = parent;
        }
    }

    pub fn render(&self, f: &mut Frame, area: Rect, title: &str) {
        let height = area.height.saturating_sub(2) as usize;
        let offset = if height == 0 { 0 } else { self.selected.saturating_sub(height - 1) };

        let lines: Vec<Line> = self
            .rows
            .iter()
            .enumerate()
            .skip(offset)
            .take(height)
            .map(|(index, row)| render_row(row, index == self.selected))
            .collect();

        let widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string())
                .border_style(Style::new().fg(HUD_GREEN)),
        );
        f.render_widget(widget, area);
    }
}

fn render_row(row: &TreeRow, selected: bool) -> Line<'static> {
    let indent = "  ".repeat(row.depth);
    let marker = match (row.id.is_some(), row.expanded) {
        (true, true) => "▾ ",
        (true, false) => "▸ ",
        (false, _) => "  ",
    };
    let label_style = match row.kind {
        RowKind::Module | RowKind::Package => Style::new().fg(HUD_GREEN).add_modifier(Modifier::BOLD),
        RowKind::Benchmark(BenchmarkStatus::Running) => Style::new().fg(CAUTION_AMBER),
        RowKind::Benchmark(_) => Style::new().fg(HUD_GREEN),
        RowKind::Information(Severity::Error) => Style::new().fg(CRITICAL_RED),
        RowKind::Information(Severity::Info) => Style::new().fg(INFO_DIM),
        RowKind::Allocation => Style::new().fg(CAUTION_AMBER),
    };
    let label_style = if selected { label_style.add_modifier(Modifier::REVERSED) } else { label_style };

    let mut spans = vec![
        Span::raw(indent),
        Span::styled(marker, Style::new().fg(INFO_DIM)),
        Span::styled(row.label.clone(), label_style),
    ];
    if let Some(description) = &row.description {
        spans.push(Span::styled(format!("  {description}"), Style::new().fg(INFO_DIM)));
    }
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AllocationRecord, ByteSize};
    use std::path::PathBuf;

    fn tree(with_result: bool) -> Vec<TreeNode> {
        let key = BenchmarkKey::new("/w/app", "BenchmarkA");
        let children = if with_result {
            vec![TreeNode::Allocation(AllocationRecord {
                file: PathBuf::from("/w/app/a_test.go"),
                line: 10,
                source: "s := build()".to_string(),
                flat: ByteSize(1024),
                cumulative: ByteSize(1024),
                function: "alloc".to_string(),
            })]
        } else {
            Vec::new()
        };
        vec![TreeNode::Module {
            path: "example.com/app".to_string(),
            root: PathBuf::from("/w/app"),
            children: vec![TreeNode::Package {
                name: "app".to_string(),
                import_path: "example.com/app".to_string(),
                dir: PathBuf::from("/w/app"),
                children: vec![
                    TreeNode::Benchmark {
                        key,
                        location: None,
                        status: BenchmarkStatus::Ran,
                        children,
                    },
                    TreeNode::Benchmark {
                        key: BenchmarkKey::new("/w/app", "BenchmarkB"),
                        location: None,
                        status: BenchmarkStatus::NotRun,
                        children: Vec::new(),
                    },
                ],
            }],
        }]
    }

    #[test]
    fn test_default_expansion() {
        let mut view = TreeView::new();
        view.rebuild(&tree(true));
        let labels: Vec<&str> = view.rows().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["example.com/app", "app", "BenchmarkA", "BenchmarkB"]);
    }

    #[test]
    fn test_toggle_benchmark_shows_allocations() {
        let mut view = TreeView::new();
        view.rebuild(&tree(true));
        view.scroll_down();
        view.scroll_down();
        assert_eq!(view.selected().unwrap().label, "BenchmarkA");

        view.toggle();
        view.rebuild(&tree(true));
        assert_eq!(view.rows().len(), 5);
        assert_eq!(view.rows()[3].label, "1kB a_test.go:10");
        assert_eq!(view.rows()[3].depth, 3);
        assert_eq!(view.selected().unwrap().label, "BenchmarkA");
    }

    #[test]
    fn test_selection_follows_node_across_rebuilds() {
        let mut view = TreeView::new();
        view.set_expanded(NodeId::Benchmark(BenchmarkKey::new("/w/app", "BenchmarkA")), true);
        view.rebuild(&tree(false));
        view.scroll_down();
        view.scroll_down();
        view.scroll_down();
        assert_eq!(view.selected().unwrap().label, "BenchmarkB");

        view.rebuild(&tree(true));
        assert_eq!(view.selected().unwrap().label, "BenchmarkB");
        assert_eq!(view.selected_index(), 4);
    }

    #[test]
    fn test_collapse_moves_to_parent() {
        let mut view = TreeView::new();
        view.rebuild(&tree(false));
        view.scroll_down();
        view.scroll_down();
        view.collapse_or_parent();
        assert_eq!(view.selected().unwrap().label, "app");

        view.collapse_or_parent();
        view.rebuild(&tree(false));
        assert_eq!(view.rows().len(), 2);
    }

    #[test]
    fn test_empty_tree_has_no_selection() {
        let mut view = TreeView::new();
        view.rebuild(&[]);
        assert!(view.selected().is_none());
        view.scroll_down();
        view.scroll_up();
        assert_eq!(view.selected_index(), 0);
    }
}
