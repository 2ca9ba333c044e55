//! Crate-wide error taxonomy.
//!
//! Module-level errors ([`MatcherError`], [`BackupError`],
//! [`TransactionError`], [`EditError`]) fold into [`PatchError`] at the
//! service boundary. Only [`PatchError::is_fatal`] errors escape
//! [`SafePatcher::execute`](crate::SafePatcher::execute); everything else is
//! reported through a failed [`OperationResult`](crate::OperationResult).

use crate::backup::BackupError;
use crate::edit::EditError;
use crate::matcher::MatcherError;
use crate::transaction::TransactionError;
use crate::validate::ErrorLocation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("pattern not found in {path}: {pattern:?}")]
    PatternNotFound { path: PathBuf, pattern: String },

    #[error("validation failed for {path}: {reason}")]
    ValidationFailed {
        path: PathBuf,
        reason: String,
        errors: Vec<ErrorLocation>,
    },

    #[error("structural integrity violated in {path} ({})", rollback_note(.rollback_succeeded))]
    StructuralIntegrity {
        path: PathBuf,
        rollback_succeeded: bool,
        errors: Vec<ErrorLocation>,
    },

    #[error("no usable snapshot for {path}: {reason}")]
    SnapshotUnavailable { path: PathBuf, reason: String },

    #[error("engine '{name}' not found (available: {})", .available.join(", "))]
    EngineNotFound { name: String, available: Vec<String> },

    #[error("engine '{name}' is unhealthy: {reason}")]
    EngineUnhealthy { name: String, reason: String },

    #[error("{operation} is not supported by engine '{engine}'")]
    NotSupported { engine: String, operation: String },

    #[error(transparent)]
    Matcher(#[from] MatcherError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("edit rejected for {path}: {source}")]
    Edit {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn rollback_note(succeeded: &bool) -> &'static str {
    if *succeeded {
        "file restored"
    } else {
        "ROLLBACK FAILED, file may be corrupted"
    }
}

/// Serializable classification of a failure, carried by operation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PatternNotFound,
    ValidationFailed,
    StructuralIntegrity,
    SnapshotUnavailable,
    EngineNotFound,
    EngineUnhealthy,
    NotSupported,
    InvalidPattern,
    Transaction,
    Io,
}

impl PatchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PatchError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            PatchError::PatternNotFound { .. } => FailureKind::PatternNotFound,
            PatchError::ValidationFailed { .. } => FailureKind::ValidationFailed,
            PatchError::StructuralIntegrity { .. } => FailureKind::StructuralIntegrity,
            PatchError::SnapshotUnavailable { .. } => FailureKind::SnapshotUnavailable,
            PatchError::EngineNotFound { .. } => FailureKind::EngineNotFound,
            PatchError::EngineUnhealthy { .. } => FailureKind::EngineUnhealthy,
            PatchError::NotSupported { .. } => FailureKind::NotSupported,
            PatchError::Matcher(_) => FailureKind::InvalidPattern,
            PatchError::Transaction(_) => FailureKind::Transaction,
            PatchError::Edit { .. } | PatchError::Io { .. } => FailureKind::Io,
        }
    }

    /// Errors the caller must not be allowed to ignore: the file on disk may
    /// not match what the caller believes it contains.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PatchError::StructuralIntegrity { .. } | PatchError::SnapshotUnavailable { .. }
        )
    }
}

impl From<BackupError> for PatchError {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::Unavailable { path, reason } => {
                PatchError::SnapshotUnavailable { path, reason }
            }
            BackupError::Corrupted {
                path,
                expected,
                actual,
            } => PatchError::SnapshotUnavailable {
                reason: format!("snapshot hash mismatch (expected {expected:016x}, found {actual:016x})"),
                path,
            },
            BackupError::Io { path, source } => PatchError::Io { path, source },
        }
    }
}
