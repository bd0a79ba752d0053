//! mt-combine - merge published statistics into running aggregates
//!
//! A CLI tool that folds per-group statistics snapshots from a published
//! directory into one aggregate file per group, deleting each snapshot once
//! it has been merged.
//!
//! Runs are not locked against each other: two runs over the same
//! directories can double count or lose updates, so schedule them one at a
//! time.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (missing directory, bad config, report write failure)
//!   2 - Files skipped or failed and --fail-on-skip set

mod aggregate;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod scanner;
mod storage;

use aggregate::{Aggregator, RunOptions};
use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use std::path::{Path, PathBuf};
use storage::FsStorage;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Where the effective configuration came from.
enum ConfigSource {
    File(PathBuf),
    Defaults,
    /// The default file exists but could not be used.
    Fallback(String),
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is loaded before logging so it can turn on verbose output.
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("mt-combine v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match source {
        ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
        ConfigSource::Defaults => debug!("No config file found, using defaults"),
        ConfigSource::Fallback(e) => warn!("Failed to load config: {}", e),
    }

    match run_combine(&config, args.dry_run) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .mt-combine.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to change the published and aggregate directories.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from file or use defaults.
///
/// An explicit `--config` that cannot be loaded is an error; a broken
/// default file only falls back to defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::File(config_path.clone())));
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::File(PathBuf::from(CONFIG_FILE_NAME)))),
        Ok(None) => Ok((Config::default(), ConfigSource::Defaults)),
        Err(e) => Ok((Config::default(), ConfigSource::Fallback(format!("{:#}", e)))),
    }
}

/// Run the merge over the configured directories. Returns exit code (0 or 2).
fn run_combine(config: &Config, dry_run: bool) -> Result<i32> {
    config.validate()?;

    let storage = FsStorage::new(&config.paths.published_dir, &config.paths.aggregate_dir);
    let mut aggregator = Aggregator::new(storage, RunOptions { dry_run });

    if dry_run {
        info!("Dry run: nothing will be written or deleted");
    }

    let report = aggregator.run().context("Run aborted")?;

    info!(
        "Run complete: {} merged, {} planned, {} skipped, {} failed",
        report.counts.merged, report.counts.planned, report.counts.skipped, report.counts.failed
    );

    let output = match config.report.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Text => report::generate_text_report(&report),
    };

    match config.report.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => print!("{}", output),
    }

    if config.general.fail_on_skip && report.has_problems() {
        eprintln!(
            "\n⛔ {} file(s) left in place. Failing (exit code 2).",
            report.counts.skipped + report.counts.failed
        );
        return Ok(2);
    }

    Ok(0)
}
