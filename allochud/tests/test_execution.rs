mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use allochud::cache::StructureCache;
use allochud::discovery::DiscoveryEngine;
use allochud::domain::BenchmarkKey;
use allochud::execution::{Coordinator, RunOutcome, RunReport};
use common::{entries, listing_for, ScriptedToolchain};

const MODULE: &str = "example.com/app";

struct Fixture {
    toolchain: Arc<ScriptedToolchain>,
    cache: Arc<StructureCache>,
    coordinator: Arc<Coordinator<ScriptedToolchain>>,
    artifacts: tempfile::TempDir,
}

async fn fixture(root: &Path, toolchain: ScriptedToolchain, jobs: usize) -> Fixture {
    let toolchain = Arc::new(toolchain);
    let cache = Arc::new(StructureCache::new());
    DiscoveryEngine::new(Arc::clone(&toolchain), Arc::clone(&cache))
        .discover(&[root.to_path_buf()], &CancellationToken::new())
        .await
        .unwrap();

    let artifacts = tempfile::tempdir().unwrap();
    let coordinator = Arc::new(
        Coordinator::new(Arc::clone(&toolchain), Arc::clone(&cache))
            .with_jobs(jobs)
            .with_artifact_dir(artifacts.path()),
    );
    Fixture { toolchain, cache, coordinator, artifacts }
}

fn names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("Benchmark{i}")).collect()
}

#[tokio::test]
async fn test_run_reports_user_allocations() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &["BenchmarkBuild"])
        .with_listing("BenchmarkBuild", &listing_for(MODULE, &root, "build", 10));
    let fx = fixture(&root, toolchain, 1).await;
    let key = BenchmarkKey::new(&root, "BenchmarkBuild");

    let report = fx.coordinator.run_benchmark(&key, &CancellationToken::new()).await;
    let RunOutcome::Allocations(records) = &report.outcome else {
        panic!("expected allocations, got {:?}", report.outcome);
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].line, 10);
    assert_eq!(records[0].function, "build");
    assert_eq!(records[0].flat.to_string(), "1.50MB");

    assert!(fx.cache.find_benchmark(&key).unwrap().has_run);
    assert_eq!(entries(fx.artifacts.path()), 0);
}

#[tokio::test]
async fn test_artifacts_removed_after_every_outcome() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &["BenchmarkFound", "BenchmarkNone", "BenchmarkBroken"])
        .with_listing("BenchmarkFound", &listing_for(MODULE, &root, "build", 10))
        .with_failing_run("BenchmarkBroken");
    let fx = fixture(&root, toolchain, 3).await;

    let cancel = CancellationToken::new();
    for name in ["BenchmarkFound", "BenchmarkNone", "BenchmarkBroken"] {
        let report = fx.coordinator.run_benchmark(&BenchmarkKey::new(&root, name), &cancel).await;
        let expected_failure = name == "BenchmarkBroken";
        assert_eq!(report.outcome.is_failure(), expected_failure, "{name}: {:?}", report.outcome);
        assert_eq!(entries(fx.artifacts.path()), 0, "artifacts left behind by {name}");
    }
}

#[tokio::test]
async fn test_no_matches_is_not_a_failure() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &["BenchmarkQuiet"]);
    let fx = fixture(&root, toolchain, 1).await;

    let report =
        fx.coordinator.run_benchmark(&BenchmarkKey::new(&root, "BenchmarkQuiet"), &CancellationToken::new()).await;
    assert_eq!(report.outcome, RunOutcome::NoneFound);
}

#[tokio::test]
async fn test_unknown_benchmark_fails_without_running() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &["BenchmarkA"]);
    let fx = fixture(&root, toolchain, 1).await;

    let report =
        fx.coordinator.run_benchmark(&BenchmarkKey::new(&root, "BenchmarkMissing"), &CancellationToken::new()).await;
    assert!(matches!(&report.outcome, RunOutcome::Failed(message) if message.contains("not found")));
    assert_eq!(fx.toolchain.profiles_recorded(), 0);
}

#[tokio::test]
async fn test_batch_respects_job_limit() {
    let root = PathBuf::from("/w/app");
    let benchmarks = names(7);
    let refs: Vec<&str> = benchmarks.iter().map(String::as_str).collect();
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &refs)
        .with_run_delay(Duration::from_millis(40));
    let fx = fixture(&root, toolchain, 2).await;

    let mut reports: Vec<RunReport> = Vec::new();
    let summary = fx
        .coordinator
        .run_all(fx.cache.run_targets(), &CancellationToken::new(), |report| reports.push(report))
        .await;

    assert_eq!(summary.total, 7);
    assert_eq!(summary.none_found, 7);
    assert_eq!(reports.len(), 7);
    assert!(fx.toolchain.max_in_flight() <= 2, "max in flight: {}", fx.toolchain.max_in_flight());
    assert_eq!(fx.toolchain.profiles_recorded(), 7);
    assert_eq!(entries(fx.artifacts.path()), 0);
}

#[tokio::test]
async fn test_cancel_stops_batch_promptly() {
    let root = PathBuf::from("/w/app");
    let benchmarks = names(5);
    let refs: Vec<&str> = benchmarks.iter().map(String::as_str).collect();
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &refs)
        .with_run_delay(Duration::from_secs(30));
    let fx = fixture(&root, toolchain, 2).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let summary = fx.coordinator.run_all(fx.cache.run_targets(), &cancel, |_| {}).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.total, 5);
    assert_eq!(summary.cancelled, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(entries(fx.artifacts.path()), 0);

    // Cancelled runs do not count as having run
    for key in fx.cache.run_targets() {
        assert!(!fx.cache.find_benchmark(&key).unwrap().has_run);
    }
}

#[tokio::test]
async fn test_bench_pattern_selects_exactly_one_benchmark() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &["BenchmarkX", "BenchmarkXY"]);
    let fx = fixture(&root, toolchain, 1).await;

    fx.coordinator.run_benchmark(&BenchmarkKey::new(&root, "BenchmarkX"), &CancellationToken::new()).await;
    let patterns = fx.toolchain.bench_patterns();
    assert_eq!(patterns, vec!["^BenchmarkX$".to_string()]);

    let pattern = regex::Regex::new(&patterns[0]).unwrap();
    assert!(pattern.is_match("BenchmarkX"));
    assert!(!pattern.is_match("BenchmarkXY"));
}

#[tokio::test]
async fn test_unreadable_listing_fails_and_cleans_up() {
    let root = PathBuf::from("/w/app");
    let listing = format!(
        "ROUTINE ======================== {MODULE}.build in {}\n   1,5MB   1,5MB     12:\tx := y\n",
        root.join("alloc_test.go").display()
    );
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &["BenchmarkBuild"])
        .with_listing("BenchmarkBuild", &listing);
    let fx = fixture(&root, toolchain, 1).await;

    let report =
        fx.coordinator.run_benchmark(&BenchmarkKey::new(&root, "BenchmarkBuild"), &CancellationToken::new()).await;
    let RunOutcome::Failed(message) = &report.outcome else {
        panic!("expected a failure, got {:?}", report.outcome);
    };
    assert!(message.contains("Profile parse failed"), "{message}");
    assert!(message.contains("1,5MB"), "{message}");
    assert_eq!(fx.toolchain.profiles_recorded(), 1);
    assert_eq!(entries(fx.artifacts.path()), 0);
}

#[tokio::test]
async fn test_empty_batch_finishes_at_once() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, MODULE)
        .with_package(&root, &root, MODULE, &["BenchmarkA"]);
    let fx = fixture(&root, toolchain, 2).await;

    let mut reports: Vec<RunReport> = Vec::new();
    let summary = fx.coordinator.run_all(Vec::new(), &CancellationToken::new(), |report| reports.push(report)).await;

    assert_eq!(summary.total, 0);
    assert_eq!(summary.with_allocations + summary.none_found + summary.failed + summary.cancelled, 0);
    assert!(reports.is_empty());
    assert_eq!(fx.toolchain.profiles_recorded(), 0);
}
