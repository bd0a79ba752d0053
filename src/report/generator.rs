//! Run report generation.
//!
//! This module renders a [`RunReport`] as plain text for the terminal or as
//! JSON for scripts.

use crate::models::{FileResult, GroupSummary, RunCounts, RunMetadata, RunReport};
use anyhow::Result;

/// Generate the complete text report.
pub fn generate_text_report(report: &RunReport) -> String {
    let mut output = String::new();

    if report.metadata.dry_run {
        output.push_str("mt-combine run report (dry run)\n\n");
    } else {
        output.push_str("mt-combine run report\n\n");
    }

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_counts_section(&report.counts));
    output.push_str(&generate_files_section(&report.files));
    output.push_str(&generate_groups_section(&report.groups));

    output
}

fn generate_metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "Run date:   {}\n",
        metadata.run_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("Published:  {}\n", metadata.published));
    section.push_str(&format!("Aggregates: {}\n", metadata.aggregate));
    section.push_str(&format!("Duration:   {:.3}s\n\n", metadata.duration_seconds));

    section
}

fn generate_counts_section(counts: &RunCounts) -> String {
    let mut section = format!("Files: {}", counts.total);

    for (label, count) in [
        ("merged", counts.merged),
        ("planned", counts.planned),
        ("skipped", counts.skipped),
        ("failed", counts.failed),
    ] {
        if count > 0 {
            section.push_str(&format!(" | {}: {}", label, count));
        }
    }
    section.push_str("\n\n");

    section
}

fn generate_files_section(files: &[FileResult]) -> String {
    if files.is_empty() {
        return "No published files were pending.\n\n".to_string();
    }

    let mut section = String::from("Files:\n");

    for file in files {
        let group = file
            .group
            .as_ref()
            .map(|g| format!(" -> {}", g))
            .unwrap_or_default();

        section.push_str(&format!(
            "  {} {}{} [{}]\n",
            file.outcome.emoji(),
            file.file,
            group,
            file.outcome
        ));

        if let Some(reason) = file.outcome.reason() {
            section.push_str(&format!("      {}\n", reason));
        }
    }
    section.push('\n');

    section
}

fn generate_groups_section(groups: &[GroupSummary]) -> String {
    if groups.is_empty() {
        return String::new();
    }

    let mut section = String::from("Groups:\n");

    for group in groups {
        section.push_str(&format!(
            "  {}: {} file(s), {} buckets (total {}), {} counts (mean {}), {} stdevs (mean {})\n",
            group.group,
            group.files_merged,
            group.buckets,
            group.profile_total,
            group.total_count_samples,
            format_mean(group.mean_total_count),
            group.time_stdev_samples,
            format_mean(group.mean_time_stdev),
        ));
    }

    section
}

fn format_mean(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "-".to_string())
}

/// Generate a pretty-printed JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
