//! Core value types shared by discovery, execution and the views.

// Byte sizes are converted to and from pprof's scaled float labels
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Index of a module inside the structure cache arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub usize);

/// Index of a package inside the structure cache arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageId(pub usize);

/// Identity of a benchmark: the package directory plus the function name.
///
/// Used everywhere a benchmark has to be referred to without holding a
/// reference into the cache (view nodes, run results, channel messages).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BenchmarkKey {
    pub package_dir: PathBuf,
    pub name: String,
}

impl BenchmarkKey {
    pub fn new(package_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self { package_dir: package_dir.into(), name: name.into() }
    }
}

impl fmt::Display for BenchmarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.package_dir.display(), self.name)
    }
}

/// A 1-based position in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32) -> Self {
        Self { file: file.into(), line }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Units pprof uses for memory labels, each 1024 times the previous one.
const BYTE_UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];

/// An amount of allocated memory.
///
/// pprof prints sizes as scaled labels (`512B`, `1.50MB`, `3.77GB`) and uses
/// `.` for an empty cell. `ByteSize` keeps the byte count and renders back to
/// the same scaled form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const ZERO: ByteSize = ByteSize(0);

    /// Parse a pprof cost cell. Returns `None` when the label does not follow
    /// the `<number><unit>` form.
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label == "." || label == "0" {
            return Some(Self::ZERO);
        }

        let split = label.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
        let (number, unit) = label.split_at(split);
        if number.is_empty() || number.starts_with('.') || number.ends_with('.') {
            return None;
        }
        let value: f64 = number.parse().ok()?;
        let exponent = BYTE_UNITS.iter().position(|u| *u == unit)?;

        let bytes = value * 1024f64.powi(exponent as i32);
        Some(Self(bytes.round() as u64))
    }

    #[must_use]
    pub fn bytes(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::Add for ByteSize {
    type Output = ByteSize;

    fn add(self, rhs: ByteSize) -> ByteSize {
        ByteSize(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for ByteSize {
    fn add_assign(&mut self, rhs: ByteSize) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0 as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit + 1 < BYTE_UNITS.len() {
            value /= 1024.0;
            unit += 1;
        }
        let number = format!("{value:.2}");
        let number = number.strip_suffix(".00").unwrap_or(&number);
        write!(f, "{number}{}", BYTE_UNITS[unit])
    }
}

/// One line of attributed allocation cost inside user-owned code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationRecord {
    /// Absolute path of the source file
    pub file: PathBuf,
    /// 1-based line number
    pub line: u32,
    /// Source text of the line, trimmed
    pub source: String,
    /// Bytes allocated by this line itself
    pub flat: ByteSize,
    /// Bytes allocated by this line and everything it calls
    pub cumulative: ByteSize,
    /// Short name of the owning function (`alloc`, `(*T).Method`)
    pub function: String,
}

impl AllocationRecord {
    #[must_use]
    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.line)
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        self.file.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_in(&self, dir: &Path) -> bool {
        self.file.starts_with(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_units() {
        assert_eq!(ByteSize::parse_label("512B"), Some(ByteSize(512)));
        assert_eq!(ByteSize::parse_label("1kB"), Some(ByteSize(1024)));
        assert_eq!(ByteSize::parse_label("1.50MB"), Some(ByteSize(1_572_864)));
        assert_eq!(ByteSize::parse_label("2GB"), Some(ByteSize(2 * 1024 * 1024 * 1024)));
    }

    #[test]
    fn test_parse_label_empty_cell() {
        assert_eq!(ByteSize::parse_label("."), Some(ByteSize::ZERO));
        assert_eq!(ByteSize::parse_label("0"), Some(ByteSize::ZERO));
    }

    #[test]
    fn test_parse_label_rejects_unknown_formats() {
        assert_eq!(ByteSize::parse_label("3,77GB"), None);
        assert_eq!(ByteSize::parse_label("3.77 GB"), None);
        assert_eq!(ByteSize::parse_label("12%"), None);
        assert_eq!(ByteSize::parse_label("GB"), None);
        assert_eq!(ByteSize::parse_label("42"), None);
    }

    #[test]
    fn test_display_matches_pprof_labels() {
        assert_eq!(ByteSize::parse_label("3.77GB").unwrap().to_string(), "3.77GB");
        assert_eq!(ByteSize::parse_label("1.50MB").unwrap().to_string(), "1.50MB");
        assert_eq!(ByteSize(512).to_string(), "512B");
        assert_eq!(ByteSize(1024).to_string(), "1kB");
        assert_eq!(ByteSize::ZERO.to_string(), "0B");
    }

    #[test]
    fn test_benchmark_key_display() {
        let key = BenchmarkKey::new("/work/pkg", "BenchmarkX");
        assert_eq!(key.to_string(), "/work/pkg::BenchmarkX");
    }
}
