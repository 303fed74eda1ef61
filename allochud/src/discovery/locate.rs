//! Find where benchmark functions are declared.
//!
//! Only the package directory itself is scanned (Go packages never span
//! subdirectories) and only `_test.go` files can declare benchmarks.

use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

use crate::domain::SourceLocation;

fn declaration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^func\s+(Benchmark\w*)\s*\(").expect("valid benchmark declaration regex")
    })
}

/// Map every `func BenchmarkX(` declared in `package_dir` to its location.
///
/// Files that cannot be read are skipped. When a name is declared twice (the
/// package would not build) the first file in name order wins.
///
/// # Errors
/// Returns an error only if the directory itself cannot be listed.
pub async fn benchmark_locations(package_dir: &Path) -> io::Result<HashMap<String, SourceLocation>> {
    let mut entries = tokio::fs::read_dir(package_dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_test_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_test.go"));
        if is_test_file {
            files.push(path);
        }
    }
    files.sort();

    let mut locations = HashMap::new();
    for file in files {
        let text = match tokio::fs::read_to_string(&file).await {
            Ok(text) => text,
            Err(e) => {
                debug!("skipping {}: {e}", file.display());
                continue;
            }
        };
        for (name, line) in scan_declarations(&text) {
            locations
                .entry(name.to_string())
                .or_insert_with(|| SourceLocation::new(file.clone(), line));
        }
    }
    Ok(locations)
}

/// `(name, 1-based line)` for every benchmark declaration in `text`.
fn scan_declarations(text: &str) -> impl Iterator<Item = (&str, u32)> {
    text.lines().enumerate().filter_map(|(index, line)| {
        let caps = declaration_regex().captures(line)?;
        let name = caps.get(1)?.as_str();
        let line = u32::try_from(index + 1).ok()?;
        Some((name, line))
    })
}
