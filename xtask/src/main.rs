use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Profile every benchmark of a Go module headlessly with the real toolchain
    Smoke {
        /// Module to profile (defaults to the bundled fixture)
        root: Option<PathBuf>,
        #[arg(long)]
        release: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::Smoke { root, release } => smoke(root, release)?,
    }

    Ok(())
}

fn smoke(root: Option<PathBuf>, release: bool) -> Result<()> {
    let root = root.unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../allochud/testdata/gomod")
    });

    let mut cmd = Command::new("cargo");
    cmd.arg("run").arg("--package").arg("allochud");
    if release {
        cmd.arg("--release");
    }
    cmd.arg("--").arg("--headless").arg("--run-all").arg(&root);

    let status = cmd.status().context("Failed to run allochud")?;

    if !status.success() {
        anyhow::bail!("Smoke run failed against {}", root.display());
    }

    println!("✓ smoke run passed");
    println!("  Root: {}", root.display());

    Ok(())
}
