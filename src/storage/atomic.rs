//! Atomic file replacement.
//!
//! Content goes to a temporary file in the destination's directory and is
//! persisted over the destination on `finish()`. Dropping the writer before
//! that removes the temporary file, leaving any previous file untouched.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::StorageError;

/// A writer that replaces its target in one step.
pub struct AtomicFileWriter {
    writer: BufWriter<NamedTempFile>,
    final_path: PathBuf,
}

impl AtomicFileWriter {
    /// Create a writer targeting `final_path`.
    ///
    /// The temporary file lives next to the target so the final rename
    /// stays on one filesystem.
    pub fn new(final_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let final_path = final_path.as_ref().to_path_buf();

        let parent_dir = match final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            Some(_) => PathBuf::from("."),
            None => {
                return Err(StorageError::io(
                    &final_path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "cannot determine parent directory",
                    ),
                ))
            }
        };

        let temp_file =
            NamedTempFile::new_in(&parent_dir).map_err(|e| StorageError::io(&parent_dir, e))?;

        Ok(Self {
            writer: BufWriter::new(temp_file),
            final_path,
        })
    }

    /// Append content to the pending file.
    pub fn write_str(&mut self, content: &str) -> Result<(), StorageError> {
        self.writer
            .write_all(content.as_bytes())
            .map_err(|e| StorageError::io(&self.final_path, e))
    }

    /// Flush and move the pending file over the target.
    pub fn finish(self) -> Result<PathBuf, StorageError> {
        let final_path = self.final_path;

        let named_temp = self
            .writer
            .into_inner()
            .map_err(|e| StorageError::io(&final_path, e.into_error()))?;

        named_temp
            .as_file()
            .sync_all()
            .map_err(|e| StorageError::io(&final_path, e))?;

        named_temp
            .persist(&final_path)
            .map_err(|e| StorageError::io(&final_path, e.error))?;

        Ok(final_path)
    }
}
