//! On-disk snapshots: provisional checkpoints, confirmed-valid states and
//! generic transaction backups.

pub mod manager;
pub mod snapshot;

pub use manager::BackupManager;
pub use snapshot::{Snapshot, SnapshotClass};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("no snapshot available for {path}: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    #[error("snapshot {path} corrupted: expected hash {expected:016x}, found {actual:016x}")]
    Corrupted {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("backup I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BackupError::Unavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
