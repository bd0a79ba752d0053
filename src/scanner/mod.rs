//! Scanner for published files waiting to be merged.
//!
//! Only regular files directly inside the published directory count, and
//! symlinks are followed to their target. Hidden files and subdirectories
//! are skipped, which also covers temporary files left by an interrupted
//! writer. Any other entry that can never be merged, such as a dangling
//! link, is returned as an [`UnusableEntry`] so it shows up in the run report.

use crate::error::StorageError;
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Published file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    /// File name inside the published directory
    pub name: String,
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Directory entry that looks like a published file but cannot be read as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusableEntry {
    /// File name, lossily converted when it is not UTF-8
    pub name: String,
    pub reason: String,
}

/// Result of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Mergeable files, sorted by name
    pub files: Vec<PendingFile>,
    /// Entries that will never be merged, sorted by name
    pub unusable: Vec<UnusableEntry>,
}

/// Lists the published directory.
pub struct PendingScanner {
    root: PathBuf,
}

impl PendingScanner {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Snapshot of the pending files, sorted by name.
    pub fn scan(&self) -> Result<ScanResult, StorageError> {
        if !self.root.is_dir() {
            return Err(StorageError::DirectoryMissing(self.root.clone()));
        }

        let mut result = ScanResult::default();

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    match e.path().and_then(|p| p.file_name()) {
                        Some(name) if !Self::is_excluded(&name.to_string_lossy()) => {
                            warn!("Cannot read {}: {}", name.to_string_lossy(), e);
                            result.unusable.push(UnusableEntry {
                                name: name.to_string_lossy().into_owned(),
                                reason: e.to_string(),
                            });
                        }
                        Some(_) => {}
                        None => warn!("Cannot read entry in {}: {}", self.root.display(), e),
                    }
                    continue;
                }
            };

            let lossy_name = entry.file_name().to_string_lossy();
            if Self::is_excluded(&lossy_name) {
                debug!("Skipping hidden file {}", lossy_name);
                continue;
            }

            if entry.file_type().is_dir() {
                debug!("Skipping directory {}", lossy_name);
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                warn!("Skipping non UTF-8 file name: {}", entry.path().display());
                result.unusable.push(UnusableEntry {
                    name: lossy_name.into_owned(),
                    reason: "file name is not valid UTF-8".to_string(),
                });
                continue;
            };

            if !entry.file_type().is_file() {
                warn!("Skipping {}: not a regular file", name);
                result.unusable.push(UnusableEntry {
                    name: name.to_string(),
                    reason: "not a regular file".to_string(),
                });
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            result.files.push(PendingFile {
                name: name.to_string(),
                path: entry.path().to_path_buf(),
                size,
            });
        }

        Ok(result)
    }

    fn is_excluded(name: &str) -> bool {
        name.starts_with('.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_lists_regular_files_in_order() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(dir.path().join("portB_001"), "1\n2\n3\n").unwrap();
        fs::write(dir.path().join("portA_002"), "").unwrap();
        fs::write(dir.path().join("portA_001"), "1\n2\n3\n").unwrap();
        fs::write(dir.path().join(".tmpX1y2"), "partial").unwrap();
        fs::create_dir(dir.path().join("archive")).unwrap();
        fs::write(dir.path().join("archive").join("old_001"), "1\n2\n3\n").unwrap();

        let result = PendingScanner::new(dir.path().to_path_buf()).scan().unwrap();
        let files = &result.files;
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["portA_001", "portA_002", "portB_001"]);
        assert_eq!(files[0].size, 6);
        assert_eq!(files[1].size, 0);
        assert_eq!(files[0].path, dir.path().join("portA_001"));
        assert!(result.unusable.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_follows_symlinks() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let elsewhere = TempDir::new().expect("Failed to create temp dir");
        let target = elsewhere.path().join("snapshot");
        fs::write(&target, "1\n0.5\n0.1\n").unwrap();

        std::os::unix::fs::symlink(&target, dir.path().join("portA_001")).unwrap();
        std::os::unix::fs::symlink(elsewhere.path(), dir.path().join("linked_dir")).unwrap();
        std::os::unix::fs::symlink(
            elsewhere.path().join("gone"),
            dir.path().join("portA_002"),
        )
        .unwrap();

        let result = PendingScanner::new(dir.path().to_path_buf()).scan().unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].name, "portA_001");
        assert_eq!(result.files[0].size, 10);

        assert_eq!(result.unusable.len(), 1);
        assert_eq!(result.unusable[0].name, "portA_002");
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_reports_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().expect("Failed to create temp dir");
        let name = OsStr::from_bytes(b"port\xff_001");
        fs::write(dir.path().join(name), "1\n0.5\n0.1\n").unwrap();
        fs::write(dir.path().join("portA_001"), "1\n0.5\n0.1\n").unwrap();

        let result = PendingScanner::new(dir.path().to_path_buf()).scan().unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.unusable.len(), 1);
        assert_eq!(result.unusable[0].name, "port\u{fffd}_001");
        assert_eq!(result.unusable[0].reason, "file name is not valid UTF-8");
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let missing = dir.path().join("published");

        let err = PendingScanner::new(missing).scan().unwrap_err();
        assert!(matches!(err, StorageError::DirectoryMissing(_)));
    }
}
