//! Analysis logic for allocation results
//!
//! Pure aggregation over run reports, separated from the TUI and the
//! headless text output that present it.

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{analyze_hotspots, AllocationHotspot, HotspotStats};
