//! Result export functionality
//!
//! Writes the runs of a session, with their allocation records and the
//! batch hotspot ranking, as a JSON document for offline inspection.

pub mod json_report;

pub use json_report::{JsonExporter, REPORT_FORMAT_VERSION};
