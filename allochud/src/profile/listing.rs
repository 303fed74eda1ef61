//! Streaming parser for `go tool pprof -list` output.
//!
//! # Format (listing contract v1)
//!
//! ```text
//! Total: 3.77GB
//! ROUTINE ======================== pkg.alloc in /a/b_test.go
//!     3.77GB     3.77GB (flat, cum)   100% of Total
//!          .          .      8:
//!     3.77GB     3.77GB     10:   s := build()
//! ```
//!
//! Each routine section starts with a `ROUTINE` marker naming the function
//! and its file, followed by annotated lines `<flat> <cum> <line>:<source>`
//! where an empty cost cell is printed as `.`. A blank line or the next
//! marker ends the section.
//!
//! # State Machine
//!
//! ```text
//!            ROUTINE marker
//!  Outside ─────────────────▶ Inside(routine)
//!     ▲                          │  │
//!     └──────── blank line ──────┘  └── annotated line ─▶ record?
//! ```
//!
//! A line becomes an [`AllocationRecord`] when its flat cost is non-zero,
//! its line number is positive, it is not the `func ... {` line opening a
//! multi-line body and the routine lives in user-owned code. Lines of other routines are
//! dropped as they stream past and never buffered.

use log::debug;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::classification::SourceScope;
use crate::domain::{AllocationRecord, ByteSize, ProfileError};
use crate::toolchain::CommandOutput;

/// Version of the listing line format this parser accepts.
pub const LISTING_FORMAT_VERSION: u32 = 1;

/// Diagnostic pprof prints on stderr when `-list` matched no routine.
pub const NO_MATCHES_DIAGNOSTIC: &str = "no matches found for regexp";

fn routine_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^ROUTINE =+ (\S+) in (.+?)\s*$").expect("valid routine regex"))
}

fn annotated_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\S+)\s+(\S+)\s+(\d+):(.*)$").expect("valid annotated line regex")
    })
}

/// Result of parsing a complete listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// At least one allocation in user code, in listing order
    Records(Vec<AllocationRecord>),
    /// Nothing to show: no matching routine, or no user-owned allocation
    NoneFound,
}

#[derive(Debug)]
struct Routine {
    function: String,
    file: PathBuf,
    user_owned: bool,
}

#[derive(Debug)]
enum State {
    Outside,
    Inside(Routine),
}

/// Incremental listing parser fed one line at a time.
#[derive(Debug)]
pub struct ListingParser {
    scope: SourceScope,
    state: State,
    records: Vec<AllocationRecord>,
    line_number: usize,
    dropped_routines: usize,
    error: Option<ProfileError>,
}

impl ListingParser {
    #[must_use]
    pub fn new(scope: SourceScope) -> Self {
        Self {
            scope,
            state: State::Outside,
            records: Vec::new(),
            line_number: 0,
            dropped_routines: 0,
            error: None,
        }
    }

    /// Consume one line of listing output.
    ///
    /// The first format violation is remembered and reported by [`finish`];
    /// later lines are ignored.
    ///
    /// [`finish`]: ListingParser::finish
    pub fn feed_line(&mut self, line: &str) {
        if self.error.is_some() {
            return;
        }
        self.line_number += 1;

        if line.trim().is_empty() {
            self.state = State::Outside;
            return;
        }

        if let Some(caps) = routine_regex().captures(line) {
            let function = caps[1].to_string();
            let file = PathBuf::from(&caps[2]);
            let user_owned = self.scope.is_user_code(&function, &file);
            if !user_owned {
                self.dropped_routines += 1;
            }
            self.state = State::Inside(Routine { function, file, user_owned });
            return;
        }

        let State::Inside(routine) = &self.state else {
            return;
        };
        if !routine.user_owned {
            return;
        }
        let Some(caps) = annotated_line_regex().captures(line) else {
            return;
        };

        let (Some(flat), Some(cumulative)) =
            (ByteSize::parse_label(&caps[1]), ByteSize::parse_label(&caps[2]))
        else {
            self.error = Some(ProfileError::UnsupportedFormat {
                version: LISTING_FORMAT_VERSION,
                line_number: self.line_number,
                line: line.to_string(),
            });
            return;
        };
        let Ok(line_no) = caps[3].parse::<u32>() else {
            return;
        };
        let source = caps[4].trim();

        if flat.is_zero() || line_no == 0 || is_declaration(source) {
            return;
        }

        self.records.push(AllocationRecord {
            file: routine.file.clone(),
            line: line_no,
            source: source.to_string(),
            flat,
            cumulative,
            function: short_function_name(&routine.function).to_string(),
        });
    }

    /// Records collected so far.
    #[must_use]
    pub fn records(&self) -> &[AllocationRecord] {
        &self.records
    }

    /// Finish parsing once the listing process has exited.
    ///
    /// # Errors
    /// `ProfileError::ToolFailed` if pprof exited non-zero for any reason other
    /// than "no matches", `ProfileError::UnsupportedFormat` if an annotated line
    /// carried cost cells outside the listing contract.
    pub fn finish(self, exit: &CommandOutput) -> Result<ParseOutcome, ProfileError> {
        if exit.stderr.contains(NO_MATCHES_DIAGNOSTIC) {
            return Ok(ParseOutcome::NoneFound);
        }
        if !exit.success() {
            return Err(ProfileError::ToolFailed {
                status: exit.status_label(),
                diagnostics: exit.diagnostics(),
            });
        }
        if let Some(error) = self.error {
            return Err(error);
        }

        debug!(
            "listing parsed: {} records, {} non-user routines dropped",
            self.records.len(),
            self.dropped_routines
        );

        if self.records.is_empty() {
            Ok(ParseOutcome::NoneFound)
        } else {
            Ok(ParseOutcome::Records(self.records))
        }
    }
}

/// Parse a complete listing produced by a successful pprof run.
///
/// # Errors
/// Same as [`ListingParser::finish`].
pub fn parse_listing(text: &str, scope: SourceScope) -> Result<ParseOutcome, ProfileError> {
    let mut parser = ListingParser::new(scope);
    for line in text.lines() {
        parser.feed_line(line);
    }
    parser.finish(&CommandOutput { code: Some(0), ..CommandOutput::default() })
}

/// The signature line of a multi-line function repeats the cost of the
/// whole body. A one-line function keeps its allocation on that line.
fn is_declaration(source: &str) -> bool {
    (source.starts_with("func ") || source.starts_with("func(")) && source.trim_end().ends_with('{')
}

/// `example.com/app/sub1.(*T).Method` → `(*T).Method`
#[must_use]
pub fn short_function_name(qualified: &str) -> &str {
    let name_start = qualified.rfind('/').map_or(0, |i| i + 1);
    let tail = &qualified[name_start..];
    tail.split_once('.').map_or(tail, |(_, name)| name)
}
