//! # allochud - Main Entry Point
//!
//! Supports two operational modes:
//! - **TUI** (default): browse modules, packages and benchmarks, profile them interactively
//! - **Headless** (`--headless [--run-all | --bench RE] [--export report.json]`): discover,
//!   optionally profile, print the tree and a hotspot summary, exit

// Main function is intentionally long for clarity
#![allow(clippy::too_many_lines)]

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use allochud::analysis::analyze_hotspots;
use allochud::cache::StructureCache;
use allochud::cli::Args;
use allochud::config::{Config, Mode};
use allochud::discovery::DiscoveryEngine;
use allochud::execution::{Coordinator, RunOutcome};
use allochud::export::JsonExporter;
use allochud::preflight::{check_roots, probe_go};
use allochud::session::Session;
use allochud::toolchain::GoToolchain;
use allochud::tui;
use allochud::view::{build_tree, render_text, RunResults};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_UNAVAILABLE: i32 = 69;

fn main() {
    let args = Args::parse();
    init_logging(&args);
    std::process::exit(match run(args) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

/// The TUI owns the terminal: without `--log-file` it gets no logger at all.
fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match &args.log_file {
        Some(path) => match File::create(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {e}", path.display());
                if !args.headless {
                    return;
                }
            }
        },
        None if !args.headless => return,
        None => {}
    }
    builder.init();
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("cannot run") {
        EXIT_UNAVAILABLE
    } else if msg.contains("workspace root not found")
        || msg.contains("not a directory")
        || msg.contains("invalid --bench pattern")
    {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: Args) -> Result<()> {
    let config = Config::from_args(args)?;

    // Run pre-flight checks before anything else
    check_roots(&config.roots)?;
    let go = probe_go(&config.go)?;
    info!("using {} ({})", config.go.display(), go.version);

    let toolchain = Arc::new(config.toolchain());
    let cache = Arc::new(StructureCache::new());
    let discovery = DiscoveryEngine::new(Arc::clone(&toolchain), Arc::clone(&cache));
    let coordinator = Coordinator::new(toolchain, Arc::clone(&cache))
        .with_jobs(config.jobs)
        .with_goroot(go.goroot.clone());

    match config.mode {
        Mode::Headless => run_headless(&config, &go.version, discovery, coordinator).await,
        Mode::Tui => run_tui(&config, cache, discovery, coordinator).await,
    }
}

async fn run_tui(
    config: &Config,
    cache: Arc<StructureCache>,
    discovery: DiscoveryEngine<GoToolchain>,
    coordinator: Coordinator<GoToolchain>,
) -> Result<()> {
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();

    // Spawn TUI thread
    let tui_cache = Arc::clone(&cache);
    let handle = std::thread::spawn(move || tui::run_browser(tui_cache, event_rx, command_tx));

    let session = Session::new(config.roots.clone(), discovery, coordinator, event_tx);
    session.serve(command_rx).await;

    match handle.join() {
        Ok(result) => result.context("Terminal UI failed"),
        Err(_) => anyhow::bail!("Terminal UI thread panicked"),
    }
}

async fn run_headless(
    config: &Config,
    go_version: &str,
    discovery: DiscoveryEngine<GoToolchain>,
    coordinator: Coordinator<GoToolchain>,
) -> Result<()> {
    let quiet = config.quiet;
    if !quiet {
        eprintln!("allochud v{} ({go_version})", env!("CARGO_PKG_VERSION"));
    }

    // Ctrl+C cancels discovery and every run in flight
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let cache = Arc::clone(discovery.cache());
    let summary = discovery.discover(&config.roots, &cancel).await?;
    if !quiet {
        eprintln!(
            "discovered: {} module(s), {} package(s), {} benchmark(s)",
            summary.modules, summary.packages, summary.benchmarks
        );
        if summary.skipped_roots > 0 || summary.failed_probes > 0 {
            eprintln!(
                "skipped: {} root(s) without a module, {} package(s) that failed to list",
                summary.skipped_roots, summary.failed_probes
            );
        }
    }

    let mut reports = Vec::new();
    if config.run {
        let targets = config.select_targets(cache.run_targets());
        let total = targets.len();
        let coordinator = Arc::new(coordinator);
        let mut done = 0usize;

        let batch = coordinator
            .run_all(targets, &cancel, |report| {
                done += 1;
                if !quiet {
                    let status = match &report.outcome {
                        RunOutcome::Allocations(records) => format!("{} site(s)", records.len()),
                        RunOutcome::NoneFound => "no allocations in user code".to_string(),
                        RunOutcome::Failed(message) => format!("FAILED: {message}"),
                        RunOutcome::Cancelled => "cancelled".to_string(),
                    };
                    eprintln!(
                        "[{done}/{total}] {} ({:.1}s) {status}",
                        report.key.name,
                        report.elapsed.as_secs_f64()
                    );
                }
                reports.push(report);
            })
            .await;

        if batch.failed > 0 {
            warn!("{} benchmark run(s) failed", batch.failed);
        }
        if cancel.is_cancelled() {
            eprintln!("interrupted: {} run(s) cancelled", batch.cancelled);
        }
    }

    let mut results = RunResults::new();
    for report in &reports {
        results.finish(report.clone());
    }
    print!("{}", render_text(&build_tree(&cache.snapshot(), &results)));

    let hotspots = analyze_hotspots(&reports);
    if !hotspots.is_empty() {
        println!("\nTop {} allocation sites:", config.top.min(hotspots.len()));
        for hotspot in hotspots.iter().take(config.top) {
            println!(
                "{:>6.1}%  {:>10}  {}  {}",
                hotspot.percentage,
                hotspot.flat.to_string(),
                hotspot.function,
                hotspot.location
            );
        }
    }

    if let Some(path) = &config.export {
        JsonExporter::new(path).export(&reports, &hotspots).context("Failed to export report")?;
        if !quiet {
            eprintln!("saved: {}", path.display());
        }
    }

    Ok(())
}
