//! Multi-file transactions with reverse-order rollback.
//!
//! Each participating file is registered before it is touched: existing files
//! get a generic snapshot, files that do not exist yet are recorded as
//! created. Rollback walks the participants newest first, restoring
//! snapshots and deleting created files, and reports per-file outcomes
//! instead of stopping at the first failure.

use crate::backup::{BackupError, BackupManager, Snapshot, SnapshotClass};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Inactive,
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Inactive => "inactive",
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        })
    }
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("cannot {operation} a transaction that is {state}")]
    InvalidState {
        operation: &'static str,
        state: TransactionState,
    },

    #[error("failed to register {path} with transaction: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: BackupError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantKind {
    /// File existed when registered; restored from this snapshot.
    Existing(Snapshot),
    /// File did not exist; deleted on rollback.
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub path: PathBuf,
    pub kind: ParticipantKind,
}

/// Per-file outcome of a rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub restored: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.restored.len() + self.removed.len()
    }
}

/// Paths are compared by canonical parent plus file name so `./a.rs` and
/// `a.rs` are one participant even before the file exists.
fn identity(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

pub struct TransactionManager {
    backups: Arc<BackupManager>,
    id: Option<Uuid>,
    state: TransactionState,
    participants: Vec<Participant>,
}

impl TransactionManager {
    pub fn new(backups: Arc<BackupManager>) -> Self {
        Self {
            backups,
            id: None,
            state: TransactionState::Inactive,
            participants: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn contains(&self, path: &Path) -> bool {
        let id = identity(path);
        self.participants.iter().any(|p| identity(&p.path) == id)
    }

    fn require_active(&self, operation: &'static str) -> Result<(), TransactionError> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(TransactionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Start a transaction. Allowed from any state but `Active`; snapshots
    /// held by a finished transaction are released first.
    pub fn begin(&mut self) -> Result<Uuid, TransactionError> {
        if self.state == TransactionState::Active {
            return Err(TransactionError::InvalidState {
                operation: "begin",
                state: self.state,
            });
        }
        self.release();
        let id = Uuid::new_v4();
        self.id = Some(id);
        self.state = TransactionState::Active;
        info!(target: "safe_patcher::transaction", %id, "transaction started");
        Ok(id)
    }

    /// Register `path`. The first registration of a path wins; later ones are
    /// no-ops.
    pub fn add_file(&mut self, path: &Path) -> Result<(), TransactionError> {
        self.require_active("add a file to")?;
        if self.contains(path) {
            return Ok(());
        }

        let kind = if path.exists() {
            let label = format!("txn-{}", self.id.map(|id| id.to_string()).unwrap_or_default());
            let snapshot = self
                .backups
                .create_snapshot(path, &label, SnapshotClass::Generic)
                .map_err(|source| TransactionError::Backup {
                    path: path.to_path_buf(),
                    source,
                })?;
            ParticipantKind::Existing(snapshot)
        } else {
            ParticipantKind::Created
        };
        self.participants.push(Participant {
            path: path.to_path_buf(),
            kind,
        });
        Ok(())
    }

    /// Mark the transaction committed. Snapshots are kept so a committed
    /// transaction can still be rolled back.
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        self.require_active("commit")?;
        self.state = TransactionState::Committed;
        info!(
            target: "safe_patcher::transaction",
            id = ?self.id,
            files = self.participants.len(),
            "transaction committed"
        );
        Ok(())
    }

    /// Undo every participant in reverse registration order.
    pub fn rollback(&mut self) -> Result<RollbackReport, TransactionError> {
        if !matches!(self.state, TransactionState::Active | TransactionState::Committed) {
            return Err(TransactionError::InvalidState {
                operation: "roll back",
                state: self.state,
            });
        }

        let mut report = RollbackReport::default();
        for participant in self.participants.iter().rev() {
            let path = &participant.path;
            match &participant.kind {
                ParticipantKind::Existing(snapshot) => {
                    match self.backups.restore(snapshot).and_then(|()| self.reconfirm(snapshot)) {
                        Ok(()) => report.restored.push(path.clone()),
                        Err(e) => report.failed.push((path.clone(), e.to_string())),
                    }
                }
                ParticipantKind::Created => match fs::remove_file(path) {
                    Ok(()) => report.removed.push(path.clone()),
                    Err(e) if e.kind() == ErrorKind::NotFound => report.removed.push(path.clone()),
                    Err(e) => report.failed.push((path.clone(), e.to_string())),
                },
            }
        }

        self.state = TransactionState::RolledBack;
        if report.is_clean() {
            info!(target: "safe_patcher::transaction", id = ?self.id, "transaction rolled back");
        } else {
            warn!(
                target: "safe_patcher::transaction",
                id = ?self.id,
                failed = report.failed.len(),
                "transaction rolled back with failures"
            );
        }
        Ok(report)
    }

    /// A confirmed-valid snapshot taken after `snapshot` holds state the
    /// rollback just undid; replace it with the restored content.
    fn reconfirm(&self, snapshot: &Snapshot) -> Result<(), BackupError> {
        let newer = self
            .backups
            .latest_valid(&snapshot.file)?
            .is_some_and(|valid| valid.age_key() > snapshot.age_key());
        if newer {
            let label = format!("txn-{}-rollback", self.id.map(|id| id.to_string()).unwrap_or_default());
            self.backups.confirm_valid(&snapshot.file, &label)?;
        }
        Ok(())
    }

    /// Drop the snapshots of a finished transaction.
    fn release(&mut self) {
        for participant in self.participants.drain(..) {
            if let ParticipantKind::Existing(snapshot) = participant.kind {
                if let Err(error) = self.backups.discard(&snapshot) {
                    warn!(target: "safe_patcher::transaction", %error, "failed to release snapshot");
                }
            }
        }
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            warn!(
                target: "safe_patcher::transaction",
                id = ?self.id,
                "transaction dropped while active; snapshots kept for manual recovery"
            );
            return;
        }
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> TransactionManager {
        TransactionManager::new(Arc::new(BackupManager::new(dir.path().join(".backups"))))
    }

    #[test]
    fn state_machine_rejects_invalid_transitions() {
        let dir = TempDir::new().unwrap();
        let mut txn = manager(&dir);

        assert!(matches!(txn.commit(), Err(TransactionError::InvalidState { .. })));
        assert!(matches!(txn.rollback(), Err(TransactionError::InvalidState { .. })));

        txn.begin().unwrap();
        assert!(matches!(txn.begin(), Err(TransactionError::InvalidState { .. })));
        txn.commit().unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);

        let first = txn.id();
        let second = txn.begin().unwrap();
        assert_ne!(first, Some(second));
        assert!(txn.participants().is_empty());
    }

    #[test]
    fn rollback_restores_and_removes_in_reverse() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("a.py");
        let created = dir.path().join("b.py");
        fs::write(&existing, "a = 1\n").unwrap();

        let mut txn = manager(&dir);
        txn.begin().unwrap();
        txn.add_file(&existing).unwrap();
        txn.add_file(&created).unwrap();

        fs::write(&existing, "a = 2\n").unwrap();
        fs::write(&created, "b = 1\n").unwrap();

        let report = txn.rollback().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.removed, vec![created.clone()]);
        assert_eq!(report.restored, vec![existing.clone()]);
        assert_eq!(fs::read_to_string(&existing).unwrap(), "a = 1\n");
        assert!(!created.exists());
        assert_eq!(txn.state(), TransactionState::RolledBack);
    }

    #[test]
    fn first_registration_wins() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "original\n").unwrap();

        let mut txn = manager(&dir);
        txn.begin().unwrap();
        txn.add_file(&file).unwrap();
        fs::write(&file, "changed\n").unwrap();
        txn.add_file(&file).unwrap();
        assert_eq!(txn.participants().len(), 1);

        txn.rollback().unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "original\n");
    }

    #[test]
    fn committed_transaction_can_roll_back() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "v1\n").unwrap();

        let mut txn = manager(&dir);
        txn.begin().unwrap();
        txn.add_file(&file).unwrap();
        fs::write(&file, "v2\n").unwrap();
        txn.commit().unwrap();

        txn.rollback().unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "v1\n");
    }

    #[test]
    fn rollback_replaces_valid_snapshot_taken_inside() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "v1\n").unwrap();

        let mut txn = manager(&dir);
        txn.begin().unwrap();
        txn.add_file(&file).unwrap();
        fs::write(&file, "v2\n").unwrap();
        txn.backups.confirm_valid(&file, "edit").unwrap();

        let report = txn.rollback().unwrap();
        assert!(report.is_clean());
        let valid = txn.backups.latest_valid(&file).unwrap().unwrap();
        assert_eq!(fs::read(&valid.location).unwrap(), b"v1\n");

        fs::write(&file, "clobbered\n").unwrap();
        txn.backups.rollback(&file).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "v1\n");
    }

    #[test]
    fn older_valid_snapshot_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "v0\n").unwrap();

        let mut txn = manager(&dir);
        let before = txn.backups.confirm_valid(&file, "edit").unwrap();
        fs::write(&file, "v1\n").unwrap();
        txn.begin().unwrap();
        txn.add_file(&file).unwrap();
        fs::write(&file, "v2\n").unwrap();

        txn.rollback().unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "v1\n");
        assert_eq!(txn.backups.latest_valid(&file).unwrap(), Some(before));
    }

    #[test]
    fn failures_are_collected_not_fatal() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        fs::write(&a, "a\n").unwrap();
        fs::write(&b, "b\n").unwrap();

        let mut txn = manager(&dir);
        txn.begin().unwrap();
        txn.add_file(&a).unwrap();
        txn.add_file(&b).unwrap();

        if let ParticipantKind::Existing(snap) = &txn.participants()[1].kind {
            fs::remove_file(&snap.location).unwrap();
        }
        fs::write(&a, "a2\n").unwrap();

        let report = txn.rollback().unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, b);
        assert_eq!(report.restored, vec![a.clone()]);
        assert_eq!(fs::read_to_string(&a).unwrap(), "a\n");
    }
}
