//! Structural integrity gate around single-file mutations.
//!
//! # Flow
//!
//! 1. Pre-validate. A file that already has syntax errors may only be
//!    mutated when a confirmed-valid snapshot exists; its current error count
//!    then becomes the baseline and only an increase counts as corruption.
//! 2. Measure structure metrics for later comparison.
//! 3. Take a provisional snapshot.
//! 4. Run the mutation (caller side, between [`IntegrityValidator::begin`]
//!    and [`IntegrityGuard::commit`]).
//! 5. Re-validate. On corruption restore the provisional snapshot, or the
//!    confirmed-valid one if that fails, and raise
//!    [`PatchError::StructuralIntegrity`].
//! 6. Structure regressions are warnings only.
//! 7. A guard dropped mid-flight rolls back.
//! 8. Provisional snapshots past the retention window are pruned.

use crate::backup::{BackupManager, Snapshot};
use crate::error::PatchError;
use crate::validate::{StructureMetrics, SyntaxCheck, SyntaxReport};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PROVISIONAL_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityState {
    ValidatingPre,
    Mutating,
    ValidatingPost,
    Committed,
    RolledBack,
    RollbackFailed,
}

impl IntegrityState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IntegrityState::Committed | IntegrityState::RolledBack | IntegrityState::RollbackFailed
        )
    }
}

/// Read-only health report for one file.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub path: PathBuf,
    pub syntax: SyntaxReport,
    pub metrics: StructureMetrics,
    pub has_valid_snapshot: bool,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.syntax.is_valid()
    }
}

/// What a committed guard leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityOutcome {
    pub valid_snapshot: Snapshot,
    pub warnings: Vec<String>,
    pub syntax: SyntaxReport,
}

pub struct IntegrityValidator {
    backups: Arc<BackupManager>,
    checker: Arc<dyn SyntaxCheck>,
    retention: Duration,
}

impl IntegrityValidator {
    pub fn new(backups: Arc<BackupManager>, checker: Arc<dyn SyntaxCheck>) -> Self {
        Self {
            backups,
            checker,
            retention: DEFAULT_PROVISIONAL_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn backups(&self) -> &Arc<BackupManager> {
        &self.backups
    }

    fn read(path: &Path) -> Result<String, PatchError> {
        fs::read_to_string(path).map_err(|e| PatchError::io(path, e))
    }

    /// Check `path` without touching it.
    pub fn validate_file(&self, path: &Path, language_hint: Option<&str>) -> Result<IntegrityReport, PatchError> {
        let source = Self::read(path)?;
        Ok(IntegrityReport {
            path: path.to_path_buf(),
            syntax: self.checker.check(path, &source, language_hint),
            metrics: StructureMetrics::measure(&source),
            has_valid_snapshot: self.backups.latest_valid(path)?.is_some(),
        })
    }

    /// Steps 1 to 3. The returned guard must be committed after the mutation
    /// is written; dropping it rolls back.
    pub fn begin<'v>(
        &'v self,
        path: &Path,
        label: &str,
        language_hint: Option<&str>,
    ) -> Result<IntegrityGuard<'v>, PatchError> {
        let original = Self::read(path)?;
        let pre = self.checker.check(path, &original, language_hint);

        if !pre.is_valid() && self.backups.latest_valid(path)?.is_none() {
            return Err(PatchError::ValidationFailed {
                path: path.to_path_buf(),
                reason: format!(
                    "file already has {} syntax error(s) and no confirmed-valid snapshot",
                    pre.error_count()
                ),
                errors: pre.errors,
            });
        }
        if !pre.is_valid() {
            debug!(
                target: "safe_patcher::integrity",
                path = %path.display(),
                baseline = pre.error_count(),
                "pre-state invalid, using its error count as baseline"
            );
        }

        let baseline_metrics = StructureMetrics::measure(&original);
        let provisional = self.backups.create_provisional(path, label)?;

        Ok(IntegrityGuard {
            validator: self,
            path: path.to_path_buf(),
            label: label.to_string(),
            language_hint: language_hint.map(str::to_string),
            original,
            baseline_errors: pre.error_count(),
            baseline_metrics,
            provisional: Some(provisional),
            state: IntegrityState::Mutating,
        })
    }

    /// Run `mutation` inside a guard. The closure receives the pre-state
    /// content and must write the new state to disk itself.
    pub fn run<T, F>(
        &self,
        path: &Path,
        label: &str,
        language_hint: Option<&str>,
        mutation: F,
    ) -> Result<(T, IntegrityOutcome), PatchError>
    where
        F: FnOnce(&str) -> Result<T, PatchError>,
    {
        let mut guard = self.begin(path, label, language_hint)?;
        match mutation(guard.original()) {
            Ok(value) => guard.commit().map(|outcome| (value, outcome)),
            Err(err) => {
                if guard.restore_checkpoint() {
                    Err(err)
                } else {
                    Err(PatchError::StructuralIntegrity {
                        path: path.to_path_buf(),
                        rollback_succeeded: false,
                        errors: Vec::new(),
                    })
                }
            }
        }
    }

    fn prune(&self) {
        match self.backups.prune_provisional(self.retention) {
            Ok(0) => {}
            Ok(removed) => debug!(target: "safe_patcher::integrity", removed, "pruned provisional snapshots"),
            Err(error) => warn!(target: "safe_patcher::integrity", %error, "provisional prune failed"),
        }
    }
}

/// Scoped integrity check for one mutation.
pub struct IntegrityGuard<'v> {
    validator: &'v IntegrityValidator,
    path: PathBuf,
    label: String,
    language_hint: Option<String>,
    original: String,
    baseline_errors: usize,
    baseline_metrics: StructureMetrics,
    provisional: Option<Snapshot>,
    state: IntegrityState,
}

impl IntegrityGuard<'_> {
    pub fn state(&self) -> IntegrityState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File content when the guard was opened.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn provisional(&self) -> Option<&Snapshot> {
        self.provisional.as_ref()
    }

    /// Steps 5, 6 and 8.
    pub fn commit(mut self) -> Result<IntegrityOutcome, PatchError> {
        self.state = IntegrityState::ValidatingPost;
        let validator = self.validator;

        let current = match IntegrityValidator::read(&self.path) {
            Ok(current) => current,
            Err(err) => {
                self.restore_checkpoint();
                return Err(err);
            }
        };
        let post = validator
            .checker
            .check(&self.path, &current, self.language_hint.as_deref());

        if post.error_count() > self.baseline_errors {
            warn!(
                target: "safe_patcher::integrity",
                path = %self.path.display(),
                label = %self.label,
                before = self.baseline_errors,
                after = post.error_count(),
                "mutation broke syntax, rolling back"
            );
            let rollback_succeeded = self.restore_checkpoint();
            return Err(PatchError::StructuralIntegrity {
                path: self.path.clone(),
                rollback_succeeded,
                errors: post.errors,
            });
        }

        let warnings = StructureMetrics::measure(&current).regressions(&self.baseline_metrics);
        for warning in &warnings {
            warn!(target: "safe_patcher::integrity", path = %self.path.display(), "{warning}");
        }

        let valid_snapshot = match validator.backups.confirm_valid(&self.path, &self.label) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.restore_checkpoint();
                return Err(err.into());
            }
        };
        if let Some(provisional) = self.provisional.take() {
            if let Err(error) = validator.backups.discard(&provisional) {
                warn!(target: "safe_patcher::integrity", %error, "failed to discard provisional snapshot");
            }
        }
        self.state = IntegrityState::Committed;
        info!(
            target: "safe_patcher::integrity",
            path = %self.path.display(),
            label = %self.label,
            "mutation committed"
        );
        validator.prune();

        Ok(IntegrityOutcome {
            valid_snapshot,
            warnings,
            syntax: post,
        })
    }

    /// Abandon the mutation and restore the pre-state.
    pub fn rollback(mut self) -> Result<(), PatchError> {
        if self.restore_checkpoint() {
            Ok(())
        } else {
            Err(PatchError::SnapshotUnavailable {
                path: self.path.clone(),
                reason: "neither the provisional nor a confirmed-valid snapshot could be restored".to_string(),
            })
        }
    }

    /// Restore the provisional snapshot, falling back to the confirmed-valid
    /// one. Sets the terminal state and returns whether the file was
    /// recovered.
    fn restore_checkpoint(&mut self) -> bool {
        let validator = self.validator;
        let backups = &validator.backups;
        let restored = match &self.provisional {
            Some(provisional) => match backups.emergency_rollback(provisional) {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        target: "safe_patcher::integrity",
                        path = %self.path.display(),
                        %error,
                        "provisional restore failed, trying confirmed-valid snapshot"
                    );
                    false
                }
            },
            None => false,
        };
        let restored = restored || backups.rollback(&self.path).is_ok();

        if restored {
            if let Some(provisional) = self.provisional.take() {
                // Best effort; the prune pass catches leftovers.
                let _ = backups.discard(&provisional);
            }
            self.state = IntegrityState::RolledBack;
        } else {
            error!(
                target: "safe_patcher::integrity",
                path = %self.path.display(),
                "ROLLBACK FAILED: file may be corrupted"
            );
            self.state = IntegrityState::RollbackFailed;
        }
        validator.prune();
        restored
    }
}

impl Drop for IntegrityGuard<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            debug!(
                target: "safe_patcher::integrity",
                path = %self.path.display(),
                "guard dropped before commit, rolling back"
            );
            self.restore_checkpoint();
        }
    }
}
