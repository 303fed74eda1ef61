mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use allochud::cache::{LoadState, StructureCache};
use allochud::discovery::DiscoveryEngine;
use allochud::domain::{BenchmarkKey, DiscoveryError, SourceLocation};
use common::ScriptedToolchain;

fn engine(toolchain: ScriptedToolchain) -> (DiscoveryEngine<ScriptedToolchain>, Arc<StructureCache>) {
    let cache = Arc::new(StructureCache::new());
    (DiscoveryEngine::new(Arc::new(toolchain), Arc::clone(&cache)), cache)
}

#[tokio::test]
async fn test_failed_probe_skips_only_that_package() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, "example.com/app")
        .with_package(&root, &root, "example.com/app", &["BenchmarkA", "BenchmarkB"])
        .with_package(&root, &root.join("broken"), "example.com/app/broken", &["BenchmarkC"])
        .with_package(&root, &root.join("util"), "example.com/app/util", &["BenchmarkD"])
        .with_failing_probe(&root.join("broken"));
    let (engine, cache) = engine(toolchain);

    let summary = engine.discover(&[root.clone()], &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.modules, 1);
    assert_eq!(summary.packages, 2);
    assert_eq!(summary.benchmarks, 3);
    assert_eq!(summary.failed_probes, 1);

    assert_eq!(cache.state(), LoadState::Loaded);
    assert!(cache.find_package(&root.join("broken")).is_none());
    assert!(cache.find_benchmark(&BenchmarkKey::new(root.join("util"), "BenchmarkD")).is_ok());
}

#[tokio::test]
async fn test_packages_without_benchmarks_are_not_cached() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, "example.com/app")
        .with_package(&root, &root, "example.com/app", &["BenchmarkA"])
        .with_package(&root, &root.join("internal"), "example.com/app/internal", &[]);
    let (engine, cache) = engine(toolchain);

    engine.discover(&[root.clone()], &CancellationToken::new()).await.unwrap();
    let snapshot = cache.snapshot();
    assert_eq!(snapshot.packages.len(), 1);
    assert!(snapshot.packages.iter().all(|p| !p.benchmarks.is_empty()));
}

#[tokio::test]
async fn test_non_module_root_is_skipped() {
    let module_root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&module_root, "example.com/app")
        .with_package(&module_root, &module_root, "example.com/app", &["BenchmarkA"]);
    let (engine, cache) = engine(toolchain);

    let roots = [PathBuf::from("/w/notes"), module_root];
    let summary = engine.discover(&roots, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.skipped_roots, 1);
    assert_eq!(summary.modules, 1);
    assert_eq!(cache.snapshot().modules.len(), 1);
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, "example.com/app")
        .with_package(&root, &root, "example.com/app", &["BenchmarkA", "BenchmarkB"])
        .with_package(&root, &root.join("sub"), "example.com/app/sub", &["BenchmarkC"]);
    let (engine, cache) = engine(toolchain);
    let cancel = CancellationToken::new();

    engine.discover(&[root.clone()], &cancel).await.unwrap();
    let first = cache.snapshot();
    engine.discover(&[root.clone()], &cancel).await.unwrap();
    let second = cache.snapshot();

    assert_eq!(first.modules, second.modules);
    assert_eq!(first.packages, second.packages);
    assert!(second.generation > first.generation);
}

#[tokio::test]
async fn test_benchmark_order_follows_listing() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new().with_module(&root, "example.com/app").with_package(
        &root,
        &root,
        "example.com/app",
        &["BenchmarkZeta", "BenchmarkAlpha", "BenchmarkMid"],
    );
    let (engine, cache) = engine(toolchain);

    engine.discover(&[root], &CancellationToken::new()).await.unwrap();
    let names: Vec<String> = cache.snapshot().packages[0].benchmarks.iter().map(|b| b.name.clone()).collect();
    assert_eq!(names, vec!["BenchmarkZeta", "BenchmarkAlpha", "BenchmarkMid"]);
}

#[tokio::test]
async fn test_benchmark_declarations_are_located() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    std::fs::write(
        root.join("alloc_test.go"),
        "package app\n\nimport \"testing\"\n\nfunc BenchmarkA(b *testing.B) {\n}\n",
    )
    .unwrap();
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, "example.com/app")
        .with_package(&root, &root, "example.com/app", &["BenchmarkA", "BenchmarkGenerated"]);
    let (engine, cache) = engine(toolchain);

    engine.discover(&[root.clone()], &CancellationToken::new()).await.unwrap();

    let located = cache.find_benchmark(&BenchmarkKey::new(&root, "BenchmarkA")).unwrap();
    assert_eq!(located.location, Some(SourceLocation::new(root.join("alloc_test.go"), 5)));
    let unlocated = cache.find_benchmark(&BenchmarkKey::new(&root, "BenchmarkGenerated")).unwrap();
    assert!(unlocated.location.is_none());
}

#[tokio::test]
async fn test_cancellation_stops_discovery_promptly() {
    let root = PathBuf::from("/w/app");
    let toolchain = ScriptedToolchain::new()
        .with_module(&root, "example.com/app")
        .with_package(&root, &root, "example.com/app", &["BenchmarkA"])
        .with_probe_delay(Duration::from_secs(30));
    let (engine, cache) = engine(toolchain);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = engine.discover(&[root], &cancel).await;
    assert!(matches!(result, Err(DiscoveryError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(cache.state(), LoadState::Idle);
}

/// A stand-in `go` whose benchmark listing never finishes: it backgrounds a
/// `sleep` (recording its pid in the package directory) and waits on it.
#[cfg(target_os = "linux")]
fn hanging_go(dir: &std::path::Path, root: &std::path::Path, packages: &[&str]) -> PathBuf {
    use std::fmt::Write as _;
    use std::os::unix::fs::PermissionsExt;

    let mut package_lines = String::new();
    for name in packages {
        let _ = writeln!(package_lines, "printf '{name}\\texample.com/app/{name}\\t%s\\n' '{}'", root.join(name).display());
    }
    let script = format!(
        "#!/bin/sh\n\
         case \"$1 $2\" in\n\
         \"list -m\") printf '{{\"Path\":\"example.com/app\",\"Dir\":\"%s\"}}\\n' '{root}' ;;\n\
         \"list -e\")\n{package_lines};;\n\
         \"test -list\") sleep 300 & echo $! > grandchild.pid; wait ;;\n\
         esac\n",
        root = root.display(),
    );
    let path = dir.join("go");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(target_os = "linux")]
fn is_live(pid: &str) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .is_ok_and(|stat| stat.rsplit_once(") ").is_some_and(|(_, rest)| !rest.starts_with('Z')))
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancelled_discovery_kills_listing_processes() {
    use allochud::toolchain::GoToolchain;

    let bin = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();
    let root = workspace.path().to_path_buf();
    let packages = ["a", "b", "c", "d"];
    std::fs::write(root.join("go.mod"), "module example.com/app\n").unwrap();
    for name in packages {
        std::fs::create_dir(root.join(name)).unwrap();
    }

    let go = hanging_go(bin.path(), &root, &packages);
    let cache = Arc::new(StructureCache::new());
    let engine = DiscoveryEngine::new(Arc::new(GoToolchain::new(go)), Arc::clone(&cache)).with_probe_concurrency(4);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let result = engine.discover(&[root.clone()], &cancel).await;
    assert!(matches!(result, Err(DiscoveryError::Cancelled)));
    assert_eq!(cache.state(), LoadState::Idle);

    let pids: Vec<String> = packages
        .iter()
        .map(|name| std::fs::read_to_string(root.join(name).join("grandchild.pid")).unwrap().trim().to_string())
        .collect();
    let deadline = Instant::now() + Duration::from_secs(2);
    while pids.iter().any(|pid| is_live(pid)) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let survivors: Vec<&String> = pids.iter().filter(|pid| is_live(pid)).collect();
    assert!(survivors.is_empty(), "listing processes outlived discovery: {survivors:?}");
}
