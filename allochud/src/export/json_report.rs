//! JSON report of a session's benchmark runs.
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "generated_at": 1760000000,
//!   "runs": [
//!     { "package_dir": "/w/app", "benchmark": "BenchmarkX", "status": "allocations",
//!       "elapsed_ms": 812, "allocations": [ { "file": "...", "line": 10, ... } ] }
//!   ],
//!   "hotspots": [ { "file": "...", "line": 10, "flat": 4047925494, "percentage": 100.0, ... } ]
//! }
//! ```
//!
//! Byte sizes are written as plain byte counts.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::analysis::AllocationHotspot;
use crate::domain::{AllocationRecord, ByteSize, ExportError};
use crate::execution::{RunOutcome, RunReport};

pub const REPORT_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct Report<'a> {
    format_version: u32,
    generated_at: u64,
    runs: Vec<RunEntry<'a>>,
    hotspots: Vec<HotspotEntry<'a>>,
}

#[derive(Serialize)]
struct RunEntry<'a> {
    package_dir: &'a Path,
    benchmark: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    elapsed_ms: u64,
    allocations: &'a [AllocationRecord],
}

#[derive(Serialize)]
struct HotspotEntry<'a> {
    file: &'a PathBuf,
    line: u32,
    function: &'a str,
    source: &'a str,
    flat: ByteSize,
    cumulative: ByteSize,
    percentage: f64,
    benchmarks: Vec<&'a str>,
}

impl<'a> From<&'a RunReport> for RunEntry<'a> {
    fn from(report: &'a RunReport) -> Self {
        let (status, message) = match &report.outcome {
            RunOutcome::Allocations(_) => ("allocations", None),
            RunOutcome::NoneFound => ("none_found", None),
            RunOutcome::Failed(message) => ("failed", Some(message.as_str())),
            RunOutcome::Cancelled => ("cancelled", None),
        };
        RunEntry {
            package_dir: &report.key.package_dir,
            benchmark: &report.key.name,
            status,
            message,
            elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            allocations: report.outcome.records(),
        }
    }
}

impl<'a> From<&'a AllocationHotspot> for HotspotEntry<'a> {
    fn from(hotspot: &'a AllocationHotspot) -> Self {
        HotspotEntry {
            file: &hotspot.location.file,
            line: hotspot.location.line,
            function: &hotspot.function,
            source: &hotspot.source,
            flat: hotspot.flat,
            cumulative: hotspot.cumulative,
            percentage: hotspot.percentage,
            benchmarks: hotspot.benchmarks.iter().map(|k| k.name.as_str()).collect(),
        }
    }
}

/// Writes run reports and their hotspot ranking as one JSON document.
pub struct JsonExporter {
    path: PathBuf,
}

impl JsonExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize to any writer.
    ///
    /// # Errors
    /// `ExportError::Json` if serialization fails, `ExportError::Io` on write errors.
    pub fn write_to<W: Write>(
        writer: W,
        reports: &[RunReport],
        hotspots: &[AllocationHotspot],
    ) -> Result<(), ExportError> {
        let generated_at =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
        let report = Report {
            format_version: REPORT_FORMAT_VERSION,
            generated_at,
            runs: reports.iter().map(RunEntry::from).collect(),
            hotspots: hotspots.iter().map(HotspotEntry::from).collect(),
        };
        serde_json::to_writer_pretty(writer, &report)?;
        Ok(())
    }

    /// Write the report to the exporter's path, replacing any existing file.
    ///
    /// # Errors
    /// `ExportError::WriteFailed` if the file cannot be created, otherwise as
    /// [`write_to`](JsonExporter::write_to).
    pub fn export(&self, reports: &[RunReport], hotspots: &[AllocationHotspot]) -> Result<(), ExportError> {
        let file = File::create(&self.path)
            .map_err(|e| ExportError::WriteFailed(format!("{}: {e}", self.path.display())))?;
        let mut writer = BufWriter::new(file);
        Self::write_to(&mut writer, reports, hotspots)?;
        writer.flush()?;
        Ok(())
    }
}
