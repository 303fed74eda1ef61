//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::execution::{DEFAULT_JOBS, MAX_JOBS};
use crate::toolchain::go::DEFAULT_MEMPROFILE_RATE;

#[derive(Parser, Debug)]
#[command(
    name = "allochud",
    version,
    about = "Find memory allocation hotspots in Go benchmarks",
    after_help = "\
EXAMPLES:
    allochud                                 Browse benchmarks of the module in .
    allochud ~/src/app ~/src/lib             Several workspace roots
    allochud --headless --run-all            Profile everything, print the tree
    allochud --headless --bench 'Slice' --export report.json"
)]
pub struct Args {
    /// Go module directories (each containing go.mod), one root per module
    #[arg(value_name = "ROOT", default_value = ".")]
    pub roots: Vec<PathBuf>,

    /// Go binary to invoke
    #[arg(long, env = "ALLOCHUD_GO", default_value = "go")]
    pub go: PathBuf,

    /// Benchmarks profiled at the same time
    #[arg(short, long, default_value_t = DEFAULT_JOBS, value_parser = parse_jobs)]
    pub jobs: usize,

    /// Bytes allocated per recorded memory profile sample
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MEMPROFILE_RATE)]
    pub memprofilerate: u64,

    /// Passed to `go test -benchtime` (e.g. 1s, 100x)
    #[arg(long, value_name = "T")]
    pub benchtime: Option<String>,

    /// Run without TUI, print results to stdout
    #[arg(long)]
    pub headless: bool,

    /// Profile every discovered benchmark (headless)
    #[arg(long)]
    pub run_all: bool,

    /// Only benchmarks whose name matches this regex (headless, implies a run)
    #[arg(long, value_name = "REGEX")]
    pub bench: Option<String>,

    /// Export run results to a JSON file
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Number of entries in the hotspot summary
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub top: usize,

    /// Write logs to this file (the TUI otherwise keeps logging off the screen)
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_jobs(value: &str) -> Result<usize, String> {
    let jobs: usize = value.parse().map_err(|_| format!("`{value}` is not a number"))?;
    if (1..=MAX_JOBS).contains(&jobs) {
        Ok(jobs)
    } else {
        Err(format!("jobs must be between 1 and {MAX_JOBS}"))
    }
}
