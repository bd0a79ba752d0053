//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.mt-combine.toml` files.

use crate::cli::{Args, OutputFormat};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".mt-combine.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Directory locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Run report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Exit with code 2 when files are left behind.
    #[serde(default)]
    pub fail_on_skip: bool,
}

/// Where published files and aggregates live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_published_dir")]
    pub published_dir: PathBuf,

    #[serde(default = "default_aggregate_dir")]
    pub aggregate_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            published_dir: default_published_dir(),
            aggregate_dir: default_aggregate_dir(),
        }
    }
}

fn default_published_dir() -> PathBuf {
    PathBuf::from("../published")
}

fn default_aggregate_dir() -> PathBuf {
    PathBuf::from("../aggregate")
}

/// Run report settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Report file; stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load configuration from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values given explicitly on the command line override.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref dir) = args.published_dir {
            self.paths.published_dir = dir.clone();
        }
        if let Some(ref dir) = args.aggregate_dir {
            self.paths.aggregate_dir = dir.clone();
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(ref output) = args.output {
            self.report.output = Some(output.clone());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
        if args.fail_on_skip {
            self.general.fail_on_skip = true;
        }
    }

    /// Check the merged settings.
    pub fn validate(&self) -> Result<()> {
        if self.paths.published_dir == self.paths.aggregate_dir {
            bail!(
                "published and aggregate directories must differ (both are {})",
                self.paths.published_dir.display()
            );
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
