//! # Terminal User Interface (TUI)
//!
//! Interactive tree browser using `ratatui`.
//!
//! ## Threads
//!
//! The TUI runs on its own thread (terminal I/O is blocking) while discovery
//! and benchmark runs execute on the tokio runtime:
//!
//! ```text
//!   TUI thread                          tokio runtime
//!  ────────────                        ───────────────
//!   keys ──── Command (mpsc) ─────────▶ Session
//!   tree ◀─── SessionEvent (crossbeam)─ runs, discovery results
//!   tree ◀─── cache generation (watch)─ StructureCache
//! ```
//!
//! The tree is rebuilt from a fresh cache snapshot whenever the cache
//! generation moves or a run result arrives. Run results and the hotspot
//! summary are owned here and dropped on refresh.
//!
//! ## Sub-Modules
//!
//! - `tree` - Flattened, expandable module/package/benchmark tree
//! - `theme` - Color scheme

// TUI rendering intentionally uses precision-losing casts and long functions for clarity
#![allow(
    clippy::cast_possible_truncation,
    clippy::too_many_lines,
    clippy::needless_pass_by_value
)]

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::debug;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

mod theme;
pub mod tree; // Public for testing

use theme::{severity_color, severity_marker, BACKGROUND, CAUTION_AMBER, CRITICAL_RED, HUD_GREEN, INFO_DIM};
use tree::{RowKind, TreeView};

use crate::analysis::HotspotStats;
use crate::cache::{LoadState, StructureCache};
use crate::domain::SourceLocation;
use crate::execution::RunOutcome;
use crate::navigation;
use crate::session::{Command, SessionEvent};
use crate::view::{build_tree, BenchmarkStatus, NodeId, RunResults, Severity};

// =============================================================================
// STYLE CONSTANTS
// =============================================================================

const STYLE_HEADING: Style = Style::new().fg(HUD_GREEN).add_modifier(Modifier::BOLD);
const STYLE_LABEL: Style = Style::new().fg(CAUTION_AMBER).add_modifier(Modifier::BOLD);
const STYLE_DIM: Style = Style::new().fg(INFO_DIM);
const STYLE_KEY: Style = Style::new().fg(CAUTION_AMBER);
const STYLE_TEXT: Style = Style::new().fg(ratatui::style::Color::White);

/// Entries in the hotspot side panel
const HOTSPOT_PANEL_ENTRIES: usize = 20;

const UPDATE_INTERVAL: Duration = Duration::from_millis(100); // 10 Hz refresh

// =============================================================================
// VIEW MODES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewMode {
    Browse,
    Help,
}

// =============================================================================
// BROWSER APP
// =============================================================================

struct BrowserApp {
    cache: Arc<StructureCache>,
    generation: watch::Receiver<u64>,
    commands: UnboundedSender<Command>,

    /// Ephemeral run results, the only place allocation records live
    results: RunResults,
    hotspots: HotspotStats,
    tree: TreeView,

    view_mode: ViewMode,
    status: Option<(String, Severity)>,
    /// Location to open once the terminal has been handed to the editor
    pending_open: Option<SourceLocation>,
    dirty: bool,
    should_quit: bool,
}

impl BrowserApp {
    fn new(cache: Arc<StructureCache>, commands: UnboundedSender<Command>) -> Self {
        let generation = cache.subscribe();
        Self {
            cache,
            generation,
            commands,
            results: RunResults::new(),
            hotspots: HotspotStats::new(),
            tree: TreeView::new(),
            view_mode: ViewMode::Browse,
            status: None,
            pending_open: None,
            dirty: true,
            should_quit: false,
        }
    }

    fn send(&mut self, command: Command) {
        if self.commands.send(command).is_err() {
            self.set_error("session has stopped");
            self.should_quit = true;
        }
    }

    fn set_info(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Severity::Info));
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Severity::Error));
    }

    fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Refreshing => {
                self.results.clear();
                self.hotspots = HotspotStats::new();
                self.set_info("Discovering benchmarks...");
            }
            SessionEvent::DiscoveryFinished(Ok(summary)) => self.set_info(format!(
                "{} benchmark(s) in {} package(s)",
                summary.benchmarks, summary.packages
            )),
            SessionEvent::DiscoveryFinished(Err(message)) => self.set_error(message),
            SessionEvent::RunStarted(key) => {
                self.tree.set_expanded(NodeId::Benchmark(key.clone()), true);
                self.results.start(key);
            }
            SessionEvent::RunFinished(report) => {
                self.hotspots.record_run(&report.key, report.outcome.records());
                if let RunOutcome::Failed(message) = &report.outcome {
                    self.set_error(format!("{}: {message}", report.key.name));
                }
                self.results.finish(report);
            }
            SessionEvent::BatchFinished(summary) => self.set_info(format!(
                "Batch done: {} with allocations, {} without, {} failed, {} cancelled",
                summary.with_allocations, summary.none_found, summary.failed, summary.cancelled
            )),
            SessionEvent::Cancelled => {
                self.results.cancel_running();
                self.set_info("Cancelled");
            }
        }
        self.dirty = true;
    }

    /// Rebuild the tree if the cache or the results changed
    fn sync_tree(&mut self) {
        let changed = self.generation.has_changed().unwrap_or(false);
        if changed || self.dirty {
            self.generation.borrow_and_update();
            let nodes = build_tree(&self.cache.snapshot(), &self.results);
            self.tree.rebuild(&nodes);
            self.dirty = false;
        }
    }

    fn run_selected(&mut self) {
        let Some(key) = self.tree.selected().and_then(|row| row.benchmark_key().cloned()) else {
            return;
        };
        if self.results.is_running(&key) {
            self.set_info(format!("{} is already running", key.name));
            return;
        }
        self.send(Command::Run(key));
    }

    fn yank(&mut self) {
        let Some(location) = self.tree.selected().and_then(|row| row.location.clone()) else {
            return;
        };
        let text = location.to_string();
        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.clone())) {
            Ok(()) => self.set_info(format!("Copied {text}")),
            Err(e) => self.set_error(format!("Clipboard unavailable: {e}")),
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        match self.view_mode {
            ViewMode::Browse => match key {
                KeyCode::Char('q' | 'Q') => {
                    self.send(Command::Quit);
                    self.should_quit = true;
                }
                KeyCode::Up | KeyCode::Char('k') => self.tree.scroll_up(),
                KeyCode::Down | KeyCode::Char('j') => self.tree.scroll_down(),
                KeyCode::Right | KeyCode::Char('l') => {
                    if self.tree.selected().is_some_and(|row| !row.expanded) {
                        self.tree.toggle();
                    }
                }
                KeyCode::Left | KeyCode::Char('h') => self.tree.collapse_or_parent(),
                KeyCode::Enter | KeyCode::Char(' ') => {
                    let kind = self.tree.selected().map(|row| row.kind);
                    match kind {
                        Some(RowKind::Benchmark(BenchmarkStatus::NotRun)) => self.run_selected(),
                        Some(RowKind::Allocation) => {
                            self.pending_open = self.tree.selected().and_then(|r| r.location.clone());
                        }
                        _ => self.tree.toggle(),
                    }
                }
                KeyCode::Char('r') => self.run_selected(),
                KeyCode::Char('a') => self.send(Command::RunAll),
                KeyCode::Char('x') | KeyCode::Esc => self.send(Command::Cancel),
                KeyCode::Char('R') | KeyCode::F(5) => self.send(Command::Refresh),
                KeyCode::Char('o') => {
                    self.pending_open = self.tree.selected().and_then(|row| row.location.clone());
                }
                KeyCode::Char('y') => self.yank(),
                KeyCode::Char('?') => self.view_mode = ViewMode::Help,
                _ => {}
            },
            // Help overlay - any key closes
            ViewMode::Help => self.view_mode = ViewMode::Browse,
        }
        self.dirty = true;
    }
}

// =============================================================================
// RENDERERS
// =============================================================================

fn render_header(f: &mut ratatui::Frame, area: Rect, app: &BrowserApp) {
    let snapshot_state = app.cache.state();
    let (state_label, state_style) = match snapshot_state {
        LoadState::Loading => ("[DISCOVERING]", Style::new().fg(CAUTION_AMBER)),
        LoadState::Loaded => ("[READY]", Style::new().fg(HUD_GREEN)),
        LoadState::Idle => ("[IDLE]", STYLE_DIM),
    };
    let running = app.results.running_count();
    let benchmarks = app.tree.rows().iter().filter(|r| matches!(r.kind, RowKind::Benchmark(_))).count();

    let header = Paragraph::new(vec![Line::from(vec![
        Span::styled("ALLOCHUD", STYLE_HEADING),
        Span::styled(" | ", STYLE_DIM),
        Span::styled(state_label, state_style.add_modifier(Modifier::BOLD)),
        Span::styled(" | ", STYLE_DIM),
        Span::styled(format!("{benchmarks} visible benchmarks"), Style::new().fg(HUD_GREEN)),
        Span::styled(" | ", STYLE_DIM),
        Span::styled(
            format!("{running} running"),
            if running > 0 { Style::new().fg(CRITICAL_RED) } else { STYLE_DIM },
        ),
        Span::styled(" | ", STYLE_DIM),
        Span::styled(format!("{} allocated", app.hotspots.total_flat()), Style::new().fg(CAUTION_AMBER)),
    ])])
    .block(Block::default().borders(Borders::ALL).border_style(Style::new().fg(CRITICAL_RED)));
    f.render_widget(header, area);
}

fn render_hotspots(f: &mut ratatui::Frame, area: Rect, app: &BrowserApp) {
    let hotspots = app.hotspots.top(HOTSPOT_PANEL_ENTRIES);
    let mut lines = Vec::with_capacity(hotspots.len() * 2);
    if hotspots.is_empty() {
        lines.push(Line::from(Span::styled("Run benchmarks to rank allocation sites", STYLE_DIM)));
    }
    for hotspot in &hotspots {
        let color = severity_color(hotspot.percentage);
        let file = hotspot.location.file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        lines.push(Line::from(vec![
            Span::styled(severity_marker(hotspot.percentage), Style::new().fg(color)),
            Span::styled(format!(" {:>5.1}% ", hotspot.percentage), Style::new().fg(color)),
            Span::styled(hotspot.flat.to_string(), STYLE_LABEL),
            Span::styled(format!("  {}", hotspot.function), STYLE_TEXT),
        ]));
        lines.push(Line::from(Span::styled(
            format!("      {file}:{}  ({} bench)", hotspot.location.line, hotspot.benchmarks.len()),
            STYLE_DIM,
        )));
    }

    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Top Allocations ")
            .border_style(Style::new().fg(HUD_GREEN)),
    );
    f.render_widget(widget, area);
}

fn render_status_bar(f: &mut ratatui::Frame, area: Rect, app: &BrowserApp) {
    let mut spans = vec![
        Span::styled("Q", STYLE_KEY),
        Span::styled(":Quit ", STYLE_DIM),
        Span::styled("Enter", STYLE_KEY),
        Span::styled(":Run/Open ", STYLE_DIM),
        Span::styled("A", STYLE_KEY),
        Span::styled(":Run all ", STYLE_DIM),
        Span::styled("X", STYLE_KEY),
        Span::styled(":Cancel ", STYLE_DIM),
        Span::styled("?", STYLE_KEY),
        Span::styled(":Help ", STYLE_DIM),
    ];
    if let Some((message, severity)) = &app.status {
        let style = match severity {
            Severity::Info => Style::new().fg(HUD_GREEN),
            Severity::Error => Style::new().fg(CRITICAL_RED),
        };
        spans.push(Span::styled(format!("| {message}"), style));
    }

    let status = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(HUD_GREEN)));
    f.render_widget(status, area);
}

/// Render the help overlay explaining the tree and keyboard shortcuts
fn render_help_overlay(f: &mut ratatui::Frame, area: Rect) {
    let popup_area = centered_popup(area, 70, 22);

    let key_line = |key: &'static str, text: &'static str| {
        Line::from(vec![Span::styled(format!("  {key:<10}"), STYLE_KEY), Span::styled(text, STYLE_TEXT)])
    };

    let help_text = vec![
        Line::from(""),
        Line::from(Span::styled("  What You're Looking At", STYLE_HEADING)),
        Line::from(Span::styled("  Go modules, their packages and benchmarks. Running a", STYLE_DIM)),
        Line::from(Span::styled("  benchmark profiles its memory and lists the lines of your", STYLE_DIM)),
        Line::from(Span::styled("  code that allocated, largest flat cost first in the panel.", STYLE_DIM)),
        Line::from(""),
        Line::from(Span::styled("  Keys", STYLE_HEADING)),
        key_line("↑↓ / jk", "Select"),
        key_line("←→ / hl", "Collapse / expand"),
        key_line("Enter", "Run benchmark, open allocation site"),
        key_line("r", "Run selected benchmark"),
        key_line("a", "Run all benchmarks"),
        key_line("x / Esc", "Cancel running work"),
        key_line("R / F5", "Refresh structure"),
        key_line("o", "Open location in $EDITOR"),
        key_line("y", "Copy location to clipboard"),
        key_line("q", "Quit"),
        Line::from(""),
        Line::from(Span::styled("  Press any key to close", STYLE_DIM)),
    ];

    let help_widget = Paragraph::new(help_text).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Help ")
            .style(Style::new().bg(BACKGROUND).fg(HUD_GREEN)),
    );

    f.render_widget(ratatui::widgets::Clear, popup_area);
    f.render_widget(help_widget, popup_area);
}

/// Create a centered popup area with given width percentage and height in lines
fn centered_popup(area: Rect, width_percent: u16, height_lines: u16) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Fill(1), Constraint::Length(height_lines), Constraint::Fill(1)])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

// =============================================================================
// ENTRY POINT
// =============================================================================

type Term = Terminal<CrosstermBackend<Stdout>>;

/// Run the interactive browser until the user quits.
///
/// 1. Sets up the terminal in raw mode
/// 2. Drains session events and watches the cache generation (non-blocking)
/// 3. Redraws at 10Hz
/// 4. Handles keyboard input
/// 5. Restores the terminal, also when the loop fails
///
/// # Errors
/// Returns an error if terminal setup or rendering fails
pub fn run_browser(
    cache: Arc<StructureCache>,
    events: Receiver<SessionEvent>,
    commands: UnboundedSender<Command>,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = BrowserApp::new(cache, commands);
    let result = event_loop(&mut terminal, &mut app, &events);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if !app.should_quit {
        // Loop failed: make sure the session stops too
        let _ = app.commands.send(Command::Quit);
    }
    result
}

fn event_loop(terminal: &mut Term, app: &mut BrowserApp, events: &Receiver<SessionEvent>) -> Result<()> {
    let mut last_update = Instant::now() - UPDATE_INTERVAL;

    loop {
        while let Ok(event) = events.try_recv() {
            app.apply_event(event);
        }

        if last_update.elapsed() >= UPDATE_INTERVAL {
            app.sync_tree();

            let view: &BrowserApp = app;
            terminal.draw(|f| {
                let outer_layout = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([
                        Constraint::Length(3), // Header
                        Constraint::Min(0),    // Tree + hotspots
                        Constraint::Length(3), // Status bar
                    ])
                    .split(f.area());

                render_header(f, outer_layout[0], view);

                let columns = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
                    .split(outer_layout[1]);
                view.tree.render(f, columns[0], " Benchmarks ");
                render_hotspots(f, columns[1], view);

                render_status_bar(f, outer_layout[2], view);

                if view.view_mode == ViewMode::Help {
                    render_help_overlay(f, f.area());
                }
            })?;

            last_update = Instant::now();
        }

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if let Some(location) = app.pending_open.take() {
            match open_in_editor(terminal, &location) {
                Ok(()) => app.set_info(format!("Opened {location}")),
                Err(e) => app.set_error(e.to_string()),
            }
            last_update = Instant::now() - UPDATE_INTERVAL;
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Hand the terminal to the editor and take it back afterwards
fn open_in_editor(terminal: &mut Term, location: &SourceLocation) -> Result<()> {
    debug!("opening {location}");
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;

    let opened = navigation::open_location(&location.file, location.line);

    enable_raw_mode()?;
    execute!(terminal.backend_mut(), EnterAlternateScreen, EnableMouseCapture)?;
    terminal.clear()?;
    opened?;
    Ok(())
}
