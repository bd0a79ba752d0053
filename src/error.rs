//! Error types for parsing, merging and storing aggregates.
//!
//! Application-level code propagates these through `anyhow`; the variants
//! here exist so the aggregator can tell a malformed input (skip the file and
//! keep it) apart from a filesystem failure (report it and move on).

use crate::models::Row;
use std::path::PathBuf;
use thiserror::Error;

/// A single row of a statistics file could not be read.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("{row} row is absent")]
    Absent { row: Row },

    #[error("{row} row, field {field}: {token:?} is not {expected}")]
    Malformed {
        row: Row,
        field: usize,
        token: String,
        expected: &'static str,
    },
}

/// A statistics file as a whole could not be decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Row(#[from] RowError),

    #[error("unexpected data on line {line}, expected exactly three rows")]
    ExtraRow { line: u64 },

    #[error("line {line} holds more than one row (stray carriage return)")]
    SplitRow { line: u64 },

    #[error("content is not valid UTF-8")]
    NotUtf8,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A published file name does not map onto a group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("file name {0:?} has no `_<suffix>` segment")]
    MissingSuffix(String),

    #[error("file name {0:?} yields an empty group")]
    EmptyGroup(String),

    #[error("group {0:?} is not usable as a file name")]
    InvalidGroup(String),
}

/// Two records could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("time profile bucket {index} overflows ({existing} + {incoming})")]
    Overflow {
        index: usize,
        existing: i64,
        incoming: i64,
    },
}

/// Failure reported by a [`crate::storage::Storage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("directory not found: {}", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("malformed file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Build an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is bad content rather than a filesystem problem.
    ///
    /// Malformed inputs are skipped and left for a later run; everything else
    /// is reported as a failure of that file.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StorageError::Malformed { .. })
    }
}
