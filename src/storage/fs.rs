//! Directory-backed storage.

use super::atomic::AtomicFileWriter;
use super::codec;
use super::{Listing, Locations, Storage};
use crate::error::{CodecError, StorageError};
use crate::models::{AggregateRecord, GroupKey};
use crate::scanner::PendingScanner;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Published files in one directory, aggregates in another.
#[derive(Debug, Clone)]
pub struct FsStorage {
    published_dir: PathBuf,
    aggregate_dir: PathBuf,
}

impl FsStorage {
    pub fn new(published_dir: impl Into<PathBuf>, aggregate_dir: impl Into<PathBuf>) -> Self {
        Self {
            published_dir: published_dir.into(),
            aggregate_dir: aggregate_dir.into(),
        }
    }

    pub fn published_path(&self, name: &str) -> PathBuf {
        self.published_dir.join(name)
    }

    pub fn aggregate_path(&self, group: &GroupKey) -> PathBuf {
        self.aggregate_dir.join(group.as_str())
    }

    fn read_record(path: &Path) -> Result<AggregateRecord, StorageError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
            ErrorKind::InvalidData => StorageError::Malformed {
                path: path.to_path_buf(),
                source: CodecError::NotUtf8,
            },
            _ => StorageError::io(path, e),
        })?;

        codec::parse_record(&content).map_err(|source| StorageError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Storage for FsStorage {
    fn locations(&self) -> Locations {
        Locations {
            published: self.published_dir.display().to_string(),
            aggregate: self.aggregate_dir.display().to_string(),
        }
    }

    fn ensure_ready(&self) -> Result<(), StorageError> {
        for dir in [&self.published_dir, &self.aggregate_dir] {
            if !dir.is_dir() {
                return Err(StorageError::DirectoryMissing(dir.clone()));
            }
        }
        Ok(())
    }

    fn list_pending(&self) -> Result<Listing, StorageError> {
        let scan = PendingScanner::new(self.published_dir.clone()).scan()?;
        for file in &scan.files {
            debug!("Pending {} ({} bytes)", file.path.display(), file.size);
        }
        Ok(Listing {
            pending: scan.files.into_iter().map(|f| f.name).collect(),
            unusable: scan.unusable,
        })
    }

    fn read_published(&self, name: &str) -> Result<AggregateRecord, StorageError> {
        Self::read_record(&self.published_path(name))
    }

    fn load_aggregate(&self, group: &GroupKey) -> Result<Option<AggregateRecord>, StorageError> {
        match Self::read_record(&self.aggregate_path(group)) {
            Ok(record) => Ok(Some(record)),
            Err(StorageError::NotFound(path)) => {
                debug!("No aggregate at {}, starting empty", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn save_aggregate(
        &mut self,
        group: &GroupKey,
        record: &AggregateRecord,
    ) -> Result<(), StorageError> {
        let mut writer = AtomicFileWriter::new(self.aggregate_path(group))?;
        writer.write_str(&codec::render_record(record))?;
        let path = writer.finish()?;
        debug!("Wrote aggregate {}", path.display());
        Ok(())
    }

    fn consume(&mut self, name: &str) -> Result<(), StorageError> {
        let path = self.published_path(name);
        fs::remove_file(&path).map_err(|e| StorageError::io(&path, e))
    }
}
