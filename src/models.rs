//! Data models for the statistics combiner.
//!
//! This module contains the core data structures used throughout the
//! application for representing groups, aggregate records, per-file
//! outcomes and the run report.

use crate::error::NameError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Position of a row inside a statistics file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Row {
    /// Per-bucket cell totals (integers)
    TimeProfiles,
    /// Total cell counts (reals)
    TotalCounts,
    /// Standard deviations of time profiles (reals)
    TimeStdevs,
}

impl Row {
    /// All rows in file order.
    pub const ALL: [Row; 3] = [Row::TimeProfiles, Row::TotalCounts, Row::TimeStdevs];
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Row::TimeProfiles => write!(f, "time profiles"),
            Row::TotalCounts => write!(f, "total counts"),
            Row::TimeStdevs => write!(f, "time stdevs"),
        }
    }
}

/// Name of a statistics group; also the file name of its aggregate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    /// Validate a group name.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();

        if name.is_empty() {
            return Err(NameError::EmptyGroup(name));
        }

        if name == "." || name == ".." || name.contains(&['/', '\\'][..]) {
            return Err(NameError::InvalidGroup(name));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three parallel sequences held for a group.
///
/// The same shape is used for a single published snapshot and for the
/// running aggregate it is merged into.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateRecord {
    /// Index-aligned bucket totals, summed positionally across merges.
    pub time_profiles: Vec<i64>,
    /// Concatenated across merges, kept sorted ascending in aggregates.
    pub total_counts: Vec<f64>,
    /// Concatenated across merges, kept sorted ascending in aggregates.
    pub time_stdevs: Vec<f64>,
}

impl AggregateRecord {
    pub fn new(time_profiles: Vec<i64>, total_counts: Vec<f64>, time_stdevs: Vec<f64>) -> Self {
        Self {
            time_profiles,
            total_counts,
            time_stdevs,
        }
    }

    /// Sum over all time profile buckets (saturating).
    pub fn profile_total(&self) -> i64 {
        self.time_profiles
            .iter()
            .fold(0i64, |acc, v| acc.saturating_add(*v))
    }

    pub fn mean_total_count(&self) -> Option<f64> {
        mean(&self.total_counts)
    }

    pub fn mean_time_stdev(&self) -> Option<f64> {
        mean(&self.time_stdevs)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// What happened to one published file during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileOutcome {
    /// Merged into its aggregate and deleted
    Merged,
    /// Would be merged (dry run)
    Planned,
    /// Malformed input, left in place for a later run
    Skipped { reason: String },
    /// Filesystem failure while processing
    Failed { reason: String },
}

impl FileOutcome {
    /// Returns an emoji representation of the outcome.
    pub fn emoji(&self) -> &'static str {
        match self {
            FileOutcome::Merged => "✅",
            FileOutcome::Planned => "📝",
            FileOutcome::Skipped { .. } => "⏭️",
            FileOutcome::Failed { .. } => "❌",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            FileOutcome::Skipped { reason } | FileOutcome::Failed { reason } => {
                Some(reason.as_str())
            }
            FileOutcome::Merged | FileOutcome::Planned => None,
        }
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Merged => write!(f, "merged"),
            FileOutcome::Planned => write!(f, "planned"),
            FileOutcome::Skipped { .. } => write!(f, "skipped"),
            FileOutcome::Failed { .. } => write!(f, "failed"),
        }
    }
}

/// Outcome of a single published file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    /// Published file name.
    pub file: String,
    /// Group the file belongs to, if its name could be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupKey>,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

impl FileResult {
    pub fn new(file: impl Into<String>, group: Option<GroupKey>, outcome: FileOutcome) -> Self {
        Self {
            file: file.into(),
            group,
            outcome,
        }
    }
}

/// State of one group's aggregate after the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group: GroupKey,
    /// Published files merged (or planned) into this group during the run.
    pub files_merged: usize,
    /// Number of time profile buckets.
    pub buckets: usize,
    /// Sum over all time profile buckets.
    pub profile_total: i64,
    pub total_count_samples: usize,
    pub time_stdev_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_total_count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_time_stdev: Option<f64>,
}

impl GroupSummary {
    pub fn from_record(group: GroupKey, files_merged: usize, record: &AggregateRecord) -> Self {
        Self {
            group,
            files_merged,
            buckets: record.time_profiles.len(),
            profile_total: record.profile_total(),
            total_count_samples: record.total_counts.len(),
            time_stdev_samples: record.time_stdevs.len(),
            mean_total_count: record.mean_total_count(),
            mean_time_stdev: record.mean_time_stdev(),
        }
    }
}

/// Counts of file outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub total: usize,
    pub merged: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunCounts {
    /// Creates counts from a list of file results.
    pub fn from_results(results: &[FileResult]) -> Self {
        let mut counts = Self {
            total: results.len(),
            ..Self::default()
        };

        for result in results {
            match result.outcome {
                FileOutcome::Merged => counts.merged += 1,
                FileOutcome::Planned => counts.planned += 1,
                FileOutcome::Skipped { .. } => counts.skipped += 1,
                FileOutcome::Failed { .. } => counts.failed += 1,
            }
        }

        counts
    }
}

/// Metadata about a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    /// Date and time the run started.
    pub run_date: DateTime<Utc>,
    /// Where published files were read from.
    pub published: String,
    /// Where aggregates were read from and written to.
    pub aggregate: String,
    /// Whether the run left storage untouched.
    pub dry_run: bool,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub counts: RunCounts,
    pub files: Vec<FileResult>,
    pub groups: Vec<GroupSummary>,
}

impl RunReport {
    pub fn new(metadata: RunMetadata, files: Vec<FileResult>, groups: Vec<GroupSummary>) -> Self {
        Self {
            metadata,
            counts: RunCounts::from_results(&files),
            files,
            groups,
        }
    }

    /// True when any file was skipped or failed.
    pub fn has_problems(&self) -> bool {
        self.counts.skipped > 0 || self.counts.failed > 0
    }
}
