//! Storage for published files and aggregates.
//!
//! The aggregator only talks to the [`Storage`] trait. [`FsStorage`] maps it
//! onto a published directory and an aggregate directory.

pub mod atomic;
pub mod codec;
pub mod fs;
#[cfg(test)]
pub mod memory;

pub use fs::FsStorage;
pub use crate::scanner::UnusableEntry;

use crate::error::StorageError;
use crate::models::{AggregateRecord, GroupKey};

/// Human-readable description of where a backend keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locations {
    pub published: String,
    pub aggregate: String,
}

/// Snapshot of the published side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Names of the files to merge, in name order.
    pub pending: Vec<String>,
    /// Entries that can never be merged and stay where they are.
    pub unusable: Vec<UnusableEntry>,
}

/// Backend holding pending published files and per-group aggregates.
pub trait Storage {
    /// Where the backend reads and writes.
    fn locations(&self) -> Locations;

    /// Check that the backend can be used at all.
    fn ensure_ready(&self) -> Result<(), StorageError>;

    /// Published files waiting to be merged.
    fn list_pending(&self) -> Result<Listing, StorageError>;

    /// Read and decode a published file.
    fn read_published(&self, name: &str) -> Result<AggregateRecord, StorageError>;

    /// Read a group's aggregate; `Ok(None)` when it does not exist yet.
    fn load_aggregate(&self, group: &GroupKey) -> Result<Option<AggregateRecord>, StorageError>;

    /// Replace a group's aggregate.
    fn save_aggregate(
        &mut self,
        group: &GroupKey,
        record: &AggregateRecord,
    ) -> Result<(), StorageError>;

    /// Remove a published file once it has been merged.
    fn consume(&mut self, name: &str) -> Result<(), StorageError>;
}
