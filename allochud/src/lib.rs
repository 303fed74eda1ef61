//! # allochud - Memory Allocation Hotspots for Go Benchmarks
//!
//! allochud discovers the Go modules under one or more workspace roots, lists
//! their packages and benchmark functions, and profiles benchmarks on demand:
//! each run records a memory profile with `go test -memprofile`, asks
//! `go tool pprof -list` for an annotated listing, and keeps the lines of
//! user code that allocated.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Go toolchain (processes)                    │
//! │   go list -m -json │ go list ./... │ go test -list │ go test    │
//! │                    -memprofile │ go tool pprof -list            │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ stdout lines, exit codes
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      allochud (This Crate)                      │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Discovery   │──▶│  Structure   │──▶│     View     │──▶ TUI  │
//! │  │   Engine     │   │    Cache     │   │   (tree)     │   text  │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │                            │                  ▲                 │
//! │                            ▼                  │ run results     │
//! │                     ┌──────────────┐   ┌──────────────┐         │
//! │                     │  Execution   │──▶│   Listing    │         │
//! │                     │ Coordinator  │   │   Parser     │         │
//! │                     └──────────────┘   └──────────────┘         │
//! │                            │                                    │
//! │                            ▼                                    │
//! │                     ┌──────────────┐   ┌──────────────┐         │
//! │                     │   Analysis   │──▶│    Export    │         │
//! │                     │  (Hotspots)  │   │ (report.json)│         │
//! │                     └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core Pipeline Modules
//!
//! - [`toolchain`]: The [`toolchain::Toolchain`] seam and its `go` implementation
//!   - `process`: Cancellable child processes, line-streamed output
//!   - `go`: Command lines and output parsing for each `go` invocation
//!
//! - [`discovery`]: Walk roots → modules → packages → benchmarks into the cache
//!
//! - [`cache`]: Arena of modules, packages and benchmarks; the one source of
//!   truth for structure, with a generation counter observers can watch
//!
//! - [`execution`]: Profile one benchmark or a bounded-concurrency batch,
//!   with temporary artifacts that are always removed
//!
//! - [`profile`]: Parse `pprof -list` output into allocation records
//!
//! - [`classification`]: Tell user code from the Go standard library
//!
//! - [`analysis`]: Rank allocation sites across runs
//!
//! - [`export`]: JSON report of runs and hotspots
//!
//! ### UI and Data Modules
//!
//! - [`view`]: Display tree derived from a cache snapshot and run results
//! - [`session`]: Async command loop behind the TUI
//! - [`tui`]: Terminal tree browser with ratatui
//! - [`navigation`]: Open a source location in `$EDITOR`
//! - [`cli`], [`config`], [`preflight`]: Arguments, resolved settings, environment checks
//! - [`domain`]: Core domain types and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Browse the benchmarks of the module in the current directory
//! allochud
//!
//! # Profile everything and print the tree with allocation sites
//! allochud --headless --run-all ~/src/app
//!
//! # Profile a subset and keep a report
//! allochud --headless --bench 'Slice' --export report.json
//! ```
//!
//! ## Key Concepts
//!
//! - **Flat bytes**: Bytes allocated by a line itself, excluding callees
//! - **memprofilerate**: Bytes allocated per recorded profile sample
//! - **Benchmark key**: Package directory plus benchmark name

// Expose modules for testing
pub mod analysis;
pub mod cache;
pub mod classification;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod execution;
pub mod export;
pub mod navigation;
pub mod preflight;
pub mod profile;
pub mod session;
pub mod toolchain;
pub mod tui;
pub mod view;
