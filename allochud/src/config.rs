//! Resolved run configuration
//!
//! [`Args`] is what the user typed; [`Config`] is what the engine runs with:
//! roots made absolute, the benchmark filter compiled and the mode decided.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::PathBuf;

use crate::cli::Args;
use crate::domain::BenchmarkKey;
use crate::toolchain::GoToolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Interactive tree browser
    Tui,
    /// Discover, optionally run, print and exit
    Headless,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub roots: Vec<PathBuf>,
    pub go: PathBuf,
    pub jobs: usize,
    pub memprofile_rate: u64,
    pub benchtime: Option<String>,
    pub mode: Mode,
    /// Profile benchmarks after discovery (headless)
    pub run: bool,
    pub bench_filter: Option<Regex>,
    pub export: Option<PathBuf>,
    pub top: usize,
    pub log_file: Option<PathBuf>,
    pub quiet: bool,
}

impl Config {
    /// Validate and resolve command-line arguments.
    ///
    /// # Errors
    /// Returns an error if `--bench` is not a valid regex.
    pub fn from_args(args: Args) -> Result<Self> {
        let bench_filter = args
            .bench
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("Invalid --bench pattern")?;

        let roots = args.roots.into_iter().map(|root| root.canonicalize().unwrap_or(root)).collect();

        Ok(Self {
            roots,
            go: args.go,
            jobs: args.jobs,
            memprofile_rate: args.memprofilerate,
            benchtime: args.benchtime,
            mode: if args.headless { Mode::Headless } else { Mode::Tui },
            run: args.run_all || bench_filter.is_some(),
            bench_filter,
            export: args.export,
            top: args.top,
            log_file: args.log_file,
            quiet: args.quiet,
        })
    }

    #[must_use]
    pub fn toolchain(&self) -> GoToolchain {
        GoToolchain::new(&self.go)
            .with_memprofile_rate(self.memprofile_rate)
            .with_benchtime(self.benchtime.clone())
    }

    /// Keep the targets selected by `--bench`, in their original order.
    #[must_use]
    pub fn select_targets(&self, targets: Vec<BenchmarkKey>) -> Vec<BenchmarkKey> {
        match &self.bench_filter {
            Some(filter) => targets.into_iter().filter(|k| filter.is_match(&k.name)).collect(),
            None => targets,
        }
    }
}
