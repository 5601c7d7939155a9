//! Checkpoint persistence
//!
//! The checkpoint is the highest delivery id already processed. It is the
//! resume point after a restart.

pub mod file;

pub use file::FileCheckpoint;

use std::path::PathBuf;

/// Trait for checkpoint backends
pub trait CheckpointStore: Send + Sync {
    /// Read the stored checkpoint. A checkpoint that was never written reads
    /// as 0.
    fn read(&self) -> Result<u64, CheckpointError>;

    /// Durably replace the stored checkpoint
    fn write(&self, id: u64) -> Result<(), CheckpointError>;
}

/// Checkpoint errors
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("Failed to read checkpoint {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write checkpoint {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Checkpoint {} is corrupt: {content:?} is not a delivery id", .path.display())]
    Corrupt { path: PathBuf, content: String },
}
