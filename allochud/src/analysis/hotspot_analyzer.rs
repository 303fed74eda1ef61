//! Hotspot analysis across benchmark runs.
//!
//! Every run yields allocation records for the lines of user code it
//! allocated on. The same line is often hit by several benchmarks (a shared
//! helper, a common constructor), so the batch view aggregates records by
//! source location and ranks locations by the bytes they allocated
//! themselves.
//!
//! # Architecture
//!
//! - **`HotspotStats`** - incremental aggregation as run reports come in
//! - **`analyze_hotspots()`** - one-shot analysis of a finished batch
//!
//! ## Data Flow
//!
//! ```text
//! RunReport
//!     │
//!     ├──► HotspotStats.record_run()  ← live summary while a batch runs
//!     │
//!     └──► RunResults.finish()        ← per-benchmark child nodes in the tree
//! ```

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use crate::domain::{AllocationRecord, BenchmarkKey, ByteSize, SourceLocation};
use crate::execution::RunReport;

// =============================================================================
// ALLOCATION HOTSPOT (OUTPUT TYPE)
// =============================================================================

/// A source line ranked by the memory it allocates.
///
/// ```text
/// TOP ALLOCATIONS
/// ─────────────────────────────────────────────────────────
///   3.77GB  61.2%  allocations_test.go:10  alloc   (2 benchmarks)
///   1.20GB  19.5%  strings_test.go:31      concat
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationHotspot {
    pub location: SourceLocation,

    /// Short name of the enclosing function.
    pub function: String,

    /// Trimmed source text of the line.
    pub source: String,

    /// Bytes allocated directly by this line, summed over all benchmarks.
    pub flat: ByteSize,

    /// Bytes allocated by this line and its callees, summed over all benchmarks.
    pub cumulative: ByteSize,

    /// Share of the batch's total flat bytes (0.0 - 100.0).
    pub percentage: f64,

    /// Benchmarks whose runs hit this line, in the order they reported.
    pub benchmarks: Vec<BenchmarkKey>,
}

// =============================================================================
// HOTSPOT STATS (AGGREGATOR)
// =============================================================================

#[derive(Debug, Default)]
pub struct HotspotStats {
    lines: HashMap<SourceLocation, LineStats>,

    /// Sum of flat bytes over every recorded line; the percentage denominator.
    total_flat: ByteSize,
}

#[derive(Debug, Clone)]
struct LineStats {
    function: String,
    source: String,
    flat: ByteSize,
    cumulative: ByteSize,
    benchmarks: Vec<BenchmarkKey>,
}

impl HotspotStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one benchmark's records into the statistics.
    pub fn record_run(&mut self, key: &BenchmarkKey, records: &[AllocationRecord]) {
        for record in records {
            self.total_flat += record.flat;

            let stats = self.lines.entry(record.location()).or_insert_with(|| LineStats {
                function: record.function.clone(),
                source: record.source.clone(),
                flat: ByteSize::ZERO,
                cumulative: ByteSize::ZERO,
                benchmarks: Vec::new(),
            });
            stats.flat += record.flat;
            stats.cumulative += record.cumulative;
            if !stats.benchmarks.contains(key) {
                stats.benchmarks.push(key.clone());
            }
        }
    }

    #[must_use]
    pub fn total_flat(&self) -> ByteSize {
        self.total_flat
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Hotspots ordered by flat bytes, largest first; ties by location.
    #[must_use]
    pub fn to_hotspots(&self) -> Vec<AllocationHotspot> {
        let total = self.total_flat.bytes();
        let mut hotspots: Vec<AllocationHotspot> = self
            .lines
            .iter()
            .map(|(location, stats)| {
                let percentage = if total > 0 {
                    (stats.flat.bytes() as f64 / total as f64) * 100.0
                } else {
                    0.0
                };
                AllocationHotspot {
                    location: location.clone(),
                    function: stats.function.clone(),
                    source: stats.source.clone(),
                    flat: stats.flat,
                    cumulative: stats.cumulative,
                    percentage,
                    benchmarks: stats.benchmarks.clone(),
                }
            })
            .collect();

        hotspots.sort_by(|a, b| b.flat.cmp(&a.flat).then_with(|| a.location.cmp(&b.location)));
        hotspots
    }

    /// The `limit` largest hotspots.
    #[must_use]
    pub fn top(&self, limit: usize) -> Vec<AllocationHotspot> {
        let mut hotspots = self.to_hotspots();
        hotspots.truncate(limit);
        hotspots
    }
}

/// Rank allocation sites over a finished batch.
#[must_use]
pub fn analyze_hotspots(reports: &[RunReport]) -> Vec<AllocationHotspot> {
    let mut stats = HotspotStats::new();
    for report in reports {
        stats.record_run(&report.key, report.outcome.records());
    }
    stats.to_hotspots()
}
