//! Binary entry point for warcdedup.
//!
//! Deduplicates one WARC file against itself and the CDX index.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use warcdedup::observability::{self, LoggingConfig};
use warcdedup::{DedupConfig, DeduplicationEngine, Error, RunStats};

/// Replaces duplicate captures in a WARC file with revisit records.
#[derive(Parser)]
#[command(name = "warcdedup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source archive (`.warc` or `.warc.gz`).
    source: Option<PathBuf>,

    /// Destination archive. Defaults to `<name>.deduplicated.warc[.gz]`.
    target: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only deduplicate within the source file; skip the CDX index.
    #[arg(long)]
    no_index: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) if cli.no_index => config.without_index(),
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(Some(&config.logging), cli.verbose);
    if let Err(e) = observability::init(&logging) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli, &config) {
        Ok((target, stats)) => {
            print_summary(&target, &stats);
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs one deduplication pass.
fn run(cli: &Cli, config: &DedupConfig) -> Result<(PathBuf, RunStats), Error> {
    let source = cli
        .source
        .as_deref()
        .ok_or_else(|| Error::InvalidInput("no source archive given".to_string()))?;
    let target = match cli.target {
        Some(ref target) => target.clone(),
        None => warcdedup::services::derive_target_path(source)?,
    };

    let stats = DeduplicationEngine::from_config(config)?.deduplicate_file(source, Some(&target))?;
    Ok((target, stats))
}

/// Loads config from `--config`, or the default locations, then applies env overrides.
fn load_config(path: Option<&Path>) -> Result<DedupConfig, Error> {
    let config = match path {
        Some(config_path) => DedupConfig::load_from_file(config_path)?,
        None => DedupConfig::load_default()?,
    };
    config.with_env_overrides()
}

fn print_summary(target: &Path, stats: &RunStats) {
    println!("Wrote {}", target.display());
    println!("  records:         {}", stats.records);
    println!("  responses:       {}", stats.responses);
    println!("  revisits, file:  {}", stats.revisits_local);
    println!("  revisits, index: {}", stats.revisits_external);
    println!("  indeterminate:   {}", stats.indeterminate);
}
