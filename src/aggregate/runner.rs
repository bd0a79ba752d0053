//! The aggregation run.
//!
//! Each run takes a snapshot of the pending published files and, file by
//! file, loads the group's aggregate, merges the snapshot into it, saves the
//! result and deletes the published file. A file that cannot be merged is
//! never deleted.

use super::merge::{group_key_for, merge};
use crate::error::StorageError;
use crate::models::{
    AggregateRecord, FileOutcome, FileResult, GroupKey, GroupSummary, RunMetadata, RunReport,
};
use crate::storage::Storage;
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Options for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Parse and merge in memory only; nothing is written or deleted.
    pub dry_run: bool,
}

/// Aggregate state built up during a run.
#[derive(Debug, Default)]
struct GroupState {
    files: usize,
    record: AggregateRecord,
}

/// Merges published files into per-group aggregates.
pub struct Aggregator<S: Storage> {
    storage: S,
    options: RunOptions,
    groups: BTreeMap<GroupKey, GroupState>,
}

impl<S: Storage> Aggregator<S> {
    pub fn new(storage: S, options: RunOptions) -> Self {
        Self {
            storage,
            options,
            groups: BTreeMap::new(),
        }
    }

    /// Process every published file present when the run starts.
    ///
    /// Only a storage that cannot be used at all fails the run. Problems with
    /// individual files end up in the report.
    pub fn run(&mut self) -> Result<RunReport, StorageError> {
        let started = Instant::now();
        let run_date = Utc::now();

        self.storage.ensure_ready()?;
        self.groups.clear();

        let listing = self.storage.list_pending()?;
        info!("Found {} published file(s)", listing.pending.len());

        let mut files: Vec<FileResult> = listing
            .unusable
            .into_iter()
            .map(|entry| {
                let group = group_key_for(&entry.name).ok();
                let reason = entry.reason;
                FileResult::new(entry.name, group, FileOutcome::Skipped { reason })
            })
            .collect();
        for name in &listing.pending {
            files.push(self.process(name));
        }
        files.sort_by(|a, b| a.file.cmp(&b.file));

        let groups = std::mem::take(&mut self.groups)
            .into_iter()
            .map(|(group, state)| GroupSummary::from_record(group, state.files, &state.record))
            .collect();

        let locations = self.storage.locations();
        let metadata = RunMetadata {
            run_date,
            published: locations.published,
            aggregate: locations.aggregate,
            dry_run: self.options.dry_run,
            duration_seconds: started.elapsed().as_secs_f64(),
        };

        Ok(RunReport::new(metadata, files, groups))
    }

    /// Merge one published file into its group's aggregate.
    pub fn process(&mut self, name: &str) -> FileResult {
        let group = match group_key_for(name) {
            Ok(group) => group,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                return FileResult::new(name, None, FileOutcome::Skipped { reason: e.to_string() });
            }
        };

        let existing = match self.current_aggregate(&group) {
            Ok(record) => record,
            Err(e) => return Self::rejected(name, group, e),
        };

        let incoming = match self.storage.read_published(name) {
            Ok(record) => record,
            Err(e) => return Self::rejected(name, group, e),
        };

        let merged = match merge(existing, incoming) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                let reason = e.to_string();
                return FileResult::new(name, Some(group), FileOutcome::Skipped { reason });
            }
        };

        if self.options.dry_run {
            debug!("Would merge {} into {}", name, group);
            self.stage(&group, merged);
            return FileResult::new(name, Some(group), FileOutcome::Planned);
        }

        if let Err(e) = self.storage.save_aggregate(&group, &merged) {
            error!("Failed to save aggregate {} for {}: {}", group, name, e);
            let reason = e.to_string();
            return FileResult::new(name, Some(group), FileOutcome::Failed { reason });
        }
        self.stage(&group, merged);

        if let Err(e) = self.storage.consume(name) {
            error!(
                "Merged {} into {} but could not delete it; the next run will merge it again: {}",
                name, group, e
            );
            let reason = format!("aggregate saved but file not deleted: {}", e);
            return FileResult::new(name, Some(group), FileOutcome::Failed { reason });
        }

        info!("Merged {} into {}", name, group);
        FileResult::new(name, Some(group), FileOutcome::Merged)
    }

    /// The aggregate a new snapshot merges into.
    ///
    /// Dry runs never save, so earlier merges of this run are taken from the
    /// staged state instead of storage.
    fn current_aggregate(&self, group: &GroupKey) -> Result<AggregateRecord, StorageError> {
        if self.options.dry_run {
            if let Some(state) = self.groups.get(group) {
                return Ok(state.record.clone());
            }
        }

        Ok(self.storage.load_aggregate(group)?.unwrap_or_default())
    }

    fn stage(&mut self, group: &GroupKey, record: AggregateRecord) {
        let state = self.groups.entry(group.clone()).or_default();
        state.files += 1;
        state.record = record;
    }

    fn rejected(name: &str, group: GroupKey, e: StorageError) -> FileResult {
        let reason = e.to_string();
        if e.is_malformed() {
            warn!("Skipping {}: {}", name, reason);
            FileResult::new(name, Some(group), FileOutcome::Skipped { reason })
        } else {
            error!("Failed to process {}: {}", name, reason);
            FileResult::new(name, Some(group), FileOutcome::Failed { reason })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::FsStorage;
    use std::fs;
    use tempfile::TempDir;

    fn run(storage: MemoryStorage) -> (RunReport, MemoryStorage) {
        run_with(storage, RunOptions::default())
    }

    fn run_with(storage: MemoryStorage, options: RunOptions) -> (RunReport, MemoryStorage) {
        let mut aggregator = Aggregator::new(storage, options);
        let report = aggregator.run().expect("run succeeds");
        (report, aggregator.storage)
    }

    fn record(profiles: &[i64], counts: &[f64], stdevs: &[f64]) -> AggregateRecord {
        AggregateRecord::new(profiles.to_vec(), counts.to_vec(), stdevs.to_vec())
    }

    #[test]
    fn test_first_publish_creates_aggregate() {
        let storage = MemoryStorage::new().with_published("portA_001", "1,2,3\n0.5,0.2\n0.1,0.3\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.merged, 1);
        assert_eq!(
            storage.aggregate("portA"),
            Some(record(&[1, 2, 3], &[0.2, 0.5], &[0.1, 0.3]))
        );
        assert!(storage.published_names().is_empty());
    }

    #[test]
    fn test_publish_merges_into_existing_aggregate() {
        let storage = MemoryStorage::new()
            .with_aggregate("portA", "1,2,3\n0.2,0.5\n0.1,0.3\n")
            .with_published("portA_002", "4,5\n0.9\n0.05\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.merged, 1);
        assert_eq!(
            storage.aggregate_text("portA"),
            Some("5,7,3\n0.2,0.5,0.9\n0.05,0.1,0.3\n")
        );
    }

    #[test]
    fn test_sequential_merges_match_single_sort() {
        let storage = MemoryStorage::new()
            .with_published("web_001", "1,1\n3.0,1.0\n0.3\n")
            .with_published("web_002", "2\n2.0\n0.1,0.2\n")
            .with_published("low_001", "7\n\n\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.merged, 3);
        assert_eq!(
            storage.aggregate("web"),
            Some(record(&[3, 1], &[1.0, 2.0, 3.0], &[0.1, 0.2, 0.3]))
        );
        assert_eq!(storage.aggregate("low"), Some(record(&[7], &[], &[])));

        let web = report.groups.iter().find(|g| g.group.as_str() == "web").unwrap();
        assert_eq!(web.files_merged, 2);
        assert_eq!(web.buckets, 2);
        assert_eq!(web.profile_total, 4);
        assert_eq!(web.total_count_samples, 3);
    }

    #[test]
    fn test_malformed_file_is_skipped_and_kept() {
        let storage = MemoryStorage::new()
            .with_published("portA_001", "1,2\nnot-a-number\n0.1\n")
            .with_published("portA_002", "1,2\n0.5\n")
            .with_published("portA_003", "1\n0.5\n0.1\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.skipped, 2);
        assert_eq!(report.counts.merged, 1);
        assert!(report.has_problems());
        assert_eq!(
            storage.published_names(),
            vec!["portA_001".to_string(), "portA_002".to_string()]
        );
        assert_eq!(storage.aggregate("portA"), Some(record(&[1], &[0.5], &[0.1])));

        let reason = report.files[1].outcome.reason().unwrap();
        assert!(reason.contains("time stdevs row is absent"), "{reason}");
    }

    #[test]
    fn test_row_split_by_carriage_return_is_skipped_and_kept() {
        let storage = MemoryStorage::new().with_published("portA_001", "1,2\r3,4\n0.5\n0.1\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.counts.merged, 0);
        assert_eq!(storage.published_names(), vec!["portA_001".to_string()]);
        assert_eq!(storage.aggregate("portA"), None);
    }

    #[test]
    fn test_unusable_entries_are_reported() {
        let storage = MemoryStorage::new()
            .with_published("portB_001", "1\n0.5\n0.1\n")
            .with_unusable("portA_001", "not a regular file");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.total, 2);
        assert_eq!(report.counts.merged, 1);
        assert_eq!(report.counts.skipped, 1);
        assert!(report.has_problems());

        let unusable = &report.files[0];
        assert_eq!(unusable.file, "portA_001");
        assert_eq!(unusable.group.as_ref().map(GroupKey::as_str), Some("portA"));
        assert_eq!(unusable.outcome.reason(), Some("not a regular file"));
        assert_eq!(storage.aggregate("portA"), None);
    }

    #[test]
    fn test_badly_named_file_is_skipped() {
        let storage = MemoryStorage::new().with_published("nosuffix", "1\n0.5\n0.1\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.files[0].group, None);
        assert_eq!(storage.published_names(), vec!["nosuffix".to_string()]);
    }

    #[test]
    fn test_malformed_aggregate_blocks_group() {
        let storage = MemoryStorage::new()
            .with_aggregate("portA", "1,2,3\n")
            .with_published("portA_001", "1\n0.5\n0.1\n")
            .with_published("portB_001", "1\n0.5\n0.1\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.counts.merged, 1);
        assert_eq!(storage.aggregate_text("portA"), Some("1,2,3\n"));
        assert_eq!(storage.published_names(), vec!["portA_001".to_string()]);
    }

    #[test]
    fn test_overflowing_profile_is_skipped() {
        let storage = MemoryStorage::new()
            .with_aggregate("portA", &format!("{}\n\n\n", i64::MAX))
            .with_published("portA_001", "1\n\n\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.skipped, 1);
        assert_eq!(storage.published_names(), vec!["portA_001".to_string()]);
    }

    #[test]
    fn test_save_failure_keeps_file_and_continues() {
        let storage = MemoryStorage::new()
            .with_read_only_group("portA")
            .with_published("portA_001", "1\n0.5\n0.1\n")
            .with_published("portB_001", "2\n0.5\n0.1\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.failed, 1);
        assert_eq!(report.counts.merged, 1);
        assert_eq!(storage.aggregate("portA"), None);
        assert_eq!(storage.published_names(), vec!["portA_001".to_string()]);
    }

    #[test]
    fn test_delete_failure_is_reported() {
        let storage = MemoryStorage::new()
            .with_locked_file("portA_001")
            .with_published("portA_001", "1\n0.5\n0.1\n");

        let (report, storage) = run(storage);

        assert_eq!(report.counts.failed, 1);
        assert_eq!(storage.aggregate("portA"), Some(record(&[1], &[0.5], &[0.1])));
        let reason = report.files[0].outcome.reason().unwrap();
        assert!(reason.starts_with("aggregate saved but file not deleted"));
    }

    #[test]
    fn test_dry_run_leaves_storage_untouched() {
        let storage = MemoryStorage::new()
            .with_aggregate("portA", "1,2,3\n0.2,0.5\n0.1,0.3\n")
            .with_published("portA_002", "4,5\n0.9\n0.05\n")
            .with_published("portA_003", "1\n\n\n")
            .with_published("portB_001", "1\nbad\n\n");

        let (report, storage) = run_with(storage, RunOptions { dry_run: true });

        assert!(report.metadata.dry_run);
        assert_eq!(report.counts.planned, 2);
        assert_eq!(report.counts.skipped, 1);
        assert_eq!(storage.published_names().len(), 3);
        assert_eq!(
            storage.aggregate_text("portA"),
            Some("1,2,3\n0.2,0.5\n0.1,0.3\n")
        );

        let group = &report.groups[0];
        assert_eq!(group.group.as_str(), "portA");
        assert_eq!(group.files_merged, 2);
        assert_eq!(group.profile_total, 16);
    }

    #[test]
    fn test_run_over_directories() {
        let root = TempDir::new().expect("Failed to create temp dir");
        let published = root.path().join("published");
        let aggregate = root.path().join("aggregate");
        fs::create_dir(&published).unwrap();
        fs::create_dir(&aggregate).unwrap();

        fs::write(aggregate.join("portA"), "1,2,3\n0.2,0.5\n0.1,0.3\n").unwrap();
        fs::write(published.join("portA_002"), "4,5\n0.9\n0.05\n").unwrap();
        fs::write(published.join("portB_001"), "1,x\n\n\n").unwrap();

        let mut aggregator =
            Aggregator::new(FsStorage::new(&published, &aggregate), RunOptions::default());
        let report = aggregator.run().unwrap();

        assert_eq!(report.counts.merged, 1);
        assert_eq!(report.counts.skipped, 1);
        assert_eq!(
            fs::read_to_string(aggregate.join("portA")).unwrap(),
            "5,7,3\n0.2,0.5,0.9\n0.05,0.1,0.3\n"
        );
        assert!(!published.join("portA_002").exists());
        assert!(published.join("portB_001").exists());
        assert!(!aggregate.join("portB").exists());

        let leftovers: Vec<_> = fs::read_dir(&aggregate).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "no temporary files should remain");
    }

    #[test]
    fn test_missing_aggregate_directory_fails_run() {
        let root = TempDir::new().expect("Failed to create temp dir");
        let published = root.path().join("published");
        fs::create_dir(&published).unwrap();
        fs::write(published.join("portA_001"), "1\n0.5\n0.1\n").unwrap();

        let storage = FsStorage::new(&published, root.path().join("aggregate"));
        let err = Aggregator::new(storage, RunOptions::default())
            .run()
            .unwrap_err();

        assert!(matches!(err, StorageError::DirectoryMissing(_)));
        assert!(published.join("portA_001").exists());
    }
}
