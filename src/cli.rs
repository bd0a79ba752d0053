//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// mt-combine - merge published statistics into running aggregates
///
/// Every file in the published directory named `<group>_<suffix>` is merged
/// into the aggregate file `<group>` and then deleted. Files that cannot be
/// parsed are left in place for the next run.
///
/// Examples:
///   mt-combine
///   mt-combine --published-dir ./published --aggregate-dir ./aggregate
///   mt-combine --dry-run --format json
///   mt-combine --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Directory holding published files
    ///
    /// Defaults to `../published` or the config file setting.
    #[arg(long, value_name = "DIR")]
    pub published_dir: Option<PathBuf>,

    /// Directory holding one aggregate file per group
    ///
    /// Defaults to `../aggregate` or the config file setting.
    #[arg(long, value_name = "DIR")]
    pub aggregate_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .mt-combine.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Parse and merge in memory without writing or deleting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Run report format (text, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the run report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exit with code 2 if any file was skipped or failed
    ///
    /// Useful when a scheduler should flag runs that left files behind.
    #[arg(long)]
    pub fail_on_skip: bool,

    /// Generate a default .mt-combine.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the run report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text (default)
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let (Some(published), Some(aggregate)) = (&self.published_dir, &self.aggregate_dir) {
            if published == aggregate {
                return Err(
                    "--published-dir and --aggregate-dir must be different directories"
                        .to_string(),
                );
            }
        }

        if let Some(ref output) = self.output {
            if output.is_dir() {
                return Err(format!(
                    "Output path is a directory: {}",
                    output.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
