//! File-backed checkpoint

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{CheckpointError, CheckpointStore};

/// Stores the checkpoint as decimal text in a single file.
///
/// Writes go to a sibling temporary file which is synced and renamed over the
/// target, so a crash mid-write leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_err(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpoint {
    fn read(&self) -> Result<u64, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }

        trimmed.parse().map_err(|_| CheckpointError::Corrupt {
            path: self.path.clone(),
            content: trimmed.to_string(),
        })
    }

    fn write(&self, id: u64) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_err(e))?;
        }

        let temp = self.temp_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .map_err(|e| self.write_err(e))?;

        file.write_all(id.to_string().as_bytes())
            .map_err(|e| self.write_err(e))?;
        file.sync_all().map_err(|e| self.write_err(e))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(|e| self.write_err(e))?;

        tracing::debug!(path = %self.path.display(), checkpoint = id, "Checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpoint::new(dir.path().join("last_checked_delivery_id"));
        assert_eq!(store.read().unwrap(), 0);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpoint::new(dir.path().join("state"));

        store.write(17).unwrap();
        assert_eq!(store.read().unwrap(), 17);

        store.write(4242).unwrap();
        assert_eq!(store.read().unwrap(), 4242);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "4242");
        assert!(!dir.path().join("state.tmp").exists());
    }

    #[test]
    fn test_reads_value_with_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        fs::write(&path, "  981\n").unwrap();

        assert_eq!(FileCheckpoint::new(path).read().unwrap(), 981);
    }

    #[test]
    fn test_empty_file_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        fs::write(&path, "\n").unwrap();

        assert_eq!(FileCheckpoint::new(path).read().unwrap(), 0);
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        fs::write(&path, "not-a-number").unwrap();

        let err = FileCheckpoint::new(path).read().unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { ref content, .. } if content == "not-a-number"));
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpoint::new(dir.path().join("nested/dir/state"));

        store.write(3).unwrap();
        assert_eq!(store.read().unwrap(), 3);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // The target's parent is a regular file, so the write cannot succeed
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let store = FileCheckpoint::new(blocker.join("state"));

        let err = store.write(1).unwrap_err();
        assert!(matches!(err, CheckpointError::Write { .. }));
    }
}
