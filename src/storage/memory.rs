//! In-memory storage used by tests.
//!
//! Contents are kept as raw text so they go through the same codec as files
//! on disk, and malformed inputs can be injected directly.

use super::codec;
use super::{Listing, Locations, Storage, UnusableEntry};
use crate::error::StorageError;
use crate::models::{AggregateRecord, GroupKey};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Error, ErrorKind};
use std::path::PathBuf;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    published: BTreeMap<String, String>,
    aggregates: BTreeMap<GroupKey, String>,
    unusable: Vec<UnusableEntry>,
    read_only_groups: BTreeSet<GroupKey>,
    locked_files: BTreeSet<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_published(mut self, name: &str, content: &str) -> Self {
        self.published.insert(name.to_string(), content.to_string());
        self
    }

    pub fn with_aggregate(mut self, group: &str, content: &str) -> Self {
        self.aggregates.insert(key(group), content.to_string());
        self
    }

    /// An entry the listing reports as never mergeable.
    pub fn with_unusable(mut self, name: &str, reason: &str) -> Self {
        self.unusable.push(UnusableEntry {
            name: name.to_string(),
            reason: reason.to_string(),
        });
        self
    }

    /// Saving this group's aggregate will fail with a permission error.
    pub fn with_read_only_group(mut self, group: &str) -> Self {
        self.read_only_groups.insert(key(group));
        self
    }

    /// Consuming this published file will fail with a permission error.
    pub fn with_locked_file(mut self, name: &str) -> Self {
        self.locked_files.insert(name.to_string());
        self
    }

    pub fn published_names(&self) -> Vec<String> {
        self.published.keys().cloned().collect()
    }

    pub fn aggregate_text(&self, group: &str) -> Option<&str> {
        self.aggregates.get(&key(group)).map(String::as_str)
    }

    pub fn aggregate(&self, group: &str) -> Option<AggregateRecord> {
        self.aggregate_text(group)
            .map(|text| codec::parse_record(text).expect("stored aggregate parses"))
    }

    fn decode(path: PathBuf, content: &str) -> Result<AggregateRecord, StorageError> {
        codec::parse_record(content).map_err(|source| StorageError::Malformed { path, source })
    }
}

fn key(group: &str) -> GroupKey {
    GroupKey::new(group).expect("valid group")
}

fn denied(path: impl Into<PathBuf>) -> StorageError {
    StorageError::io(path, Error::new(ErrorKind::PermissionDenied, "permission denied"))
}

impl Storage for MemoryStorage {
    fn locations(&self) -> Locations {
        Locations {
            published: "memory:published".to_string(),
            aggregate: "memory:aggregate".to_string(),
        }
    }

    fn ensure_ready(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn list_pending(&self) -> Result<Listing, StorageError> {
        Ok(Listing {
            pending: self.published_names(),
            unusable: self.unusable.clone(),
        })
    }

    fn read_published(&self, name: &str) -> Result<AggregateRecord, StorageError> {
        let content = self
            .published
            .get(name)
            .ok_or_else(|| StorageError::NotFound(PathBuf::from(name)))?;
        Self::decode(PathBuf::from(name), content)
    }

    fn load_aggregate(&self, group: &GroupKey) -> Result<Option<AggregateRecord>, StorageError> {
        self.aggregates
            .get(group)
            .map(|content| Self::decode(PathBuf::from(group.as_str()), content))
            .transpose()
    }

    fn save_aggregate(
        &mut self,
        group: &GroupKey,
        record: &AggregateRecord,
    ) -> Result<(), StorageError> {
        if self.read_only_groups.contains(group) {
            return Err(denied(group.as_str()));
        }
        self.aggregates
            .insert(group.clone(), codec::render_record(record));
        Ok(())
    }

    fn consume(&mut self, name: &str) -> Result<(), StorageError> {
        if self.locked_files.contains(name) {
            return Err(denied(name));
        }
        self.published
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(PathBuf::from(name)))
    }
}
