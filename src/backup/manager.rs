use super::snapshot::{self, Snapshot, SnapshotClass, EXTENSION};
use super::BackupError;
use crate::edit::{atomic_write, content_hash};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Owns the backup directory.
///
/// Snapshots of `dir/file.py` land in `<backup_dir>/<key>/`, where `<key>` is
/// the hex xxh3 of the canonical parent directory, so same-named files from
/// different directories never share a namespace. Snapshots recorded by this
/// process are indexed with their hash and verified on restore.
#[derive(Debug)]
pub struct BackupManager {
    dir: PathBuf,
    index: Mutex<HashMap<PathBuf, Snapshot>>,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding the snapshots of `path`, and the file name they are
    /// stored under.
    fn slot(&self, path: &Path) -> Result<(PathBuf, String), BackupError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BackupError::unavailable(path, "path has no file name"))?
            .to_string();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let parent = fs::canonicalize(&parent).map_err(|e| BackupError::io(&parent, e))?;
        let key = format!("{:016x}", xxh3_64(parent.to_string_lossy().as_bytes()));
        Ok((self.dir.join(key), file_name))
    }

    pub fn create_provisional(&self, path: &Path, label: &str) -> Result<Snapshot, BackupError> {
        self.create_snapshot(path, label, SnapshotClass::Temp)
    }

    /// Copy the current bytes of `path` into a new snapshot.
    pub fn create_snapshot(&self, path: &Path, label: &str, class: SnapshotClass) -> Result<Snapshot, BackupError> {
        let bytes = fs::read(path).map_err(|e| BackupError::io(path, e))?;
        let (slot, file_name) = self.slot(path)?;
        fs::create_dir_all(&slot).map_err(|e| BackupError::io(&slot, e))?;

        let created_at = Utc::now();
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let location = slot.join(snapshot::file_name(&file_name, class, created_at, sequence));
        atomic_write(&location, &bytes).map_err(|e| BackupError::io(&location, e))?;

        let snapshot = Snapshot {
            file: path.to_path_buf(),
            label: label.to_string(),
            created_at,
            content_hash: content_hash(&bytes),
            class,
            location: location.clone(),
            sequence,
        };
        self.index.lock().insert(location, snapshot.clone());
        info!(
            target: "safe_patcher::backup",
            file = %path.display(),
            class = %class,
            label,
            location = %snapshot.location.display(),
            "snapshot created"
        );
        Ok(snapshot)
    }

    /// Record the current state of `path` as the confirmed-valid snapshot.
    ///
    /// The new snapshot is written before older VALID snapshots are removed,
    /// so a known-good copy exists at every instant.
    pub fn confirm_valid(&self, path: &Path, label: &str) -> Result<Snapshot, BackupError> {
        let fresh = self.create_snapshot(path, label, SnapshotClass::Valid)?;
        for old in self.list(path)? {
            if old.class == SnapshotClass::Valid && old.location != fresh.location {
                self.discard(&old)?;
            }
        }
        Ok(fresh)
    }

    /// Delete a snapshot. Already-missing files are not an error.
    pub fn discard(&self, snapshot: &Snapshot) -> Result<(), BackupError> {
        match fs::remove_file(&snapshot.location) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(BackupError::io(&snapshot.location, e)),
        }
        self.index.lock().remove(&snapshot.location);
        debug!(target: "safe_patcher::backup", location = %snapshot.location.display(), "snapshot discarded");
        Ok(())
    }

    /// Write the snapshot bytes back over the file it was taken of.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<(), BackupError> {
        let bytes = match fs::read(&snapshot.location) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BackupError::unavailable(
                    &snapshot.file,
                    format!("snapshot {} is missing", snapshot.location.display()),
                ))
            }
            Err(e) => return Err(BackupError::io(&snapshot.location, e)),
        };

        let recorded = self.index.lock().get(&snapshot.location).map(|s| s.content_hash);
        if let Some(expected) = recorded {
            let actual = content_hash(&bytes);
            if actual != expected {
                return Err(BackupError::Corrupted {
                    path: snapshot.location.clone(),
                    expected,
                    actual,
                });
            }
        }

        atomic_write(&snapshot.file, &bytes).map_err(|e| BackupError::io(&snapshot.file, e))?;
        info!(
            target: "safe_patcher::backup",
            file = %snapshot.file.display(),
            class = %snapshot.class,
            location = %snapshot.location.display(),
            "snapshot restored"
        );
        Ok(())
    }

    /// Every snapshot of `path` on disk, oldest first.
    pub fn list(&self, path: &Path) -> Result<Vec<Snapshot>, BackupError> {
        let (slot, file_name) = match self.slot(path) {
            Ok(slot) => slot,
            // Parent gone: nothing can have been snapshotted from it.
            Err(BackupError::Io { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let entries = match fs::read_dir(&slot) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(&slot, e)),
        };

        let index = self.index.lock();
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BackupError::io(&slot, e))?;
            let location = entry.path();
            let Some(name) = location.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(parsed) = snapshot::parse_file_name(name) else {
                continue;
            };
            if parsed.owner != file_name {
                continue;
            }
            if let Some(known) = index.get(&location) {
                out.push(known.clone());
                continue;
            }
            let bytes = fs::read(&location).map_err(|e| BackupError::io(&location, e))?;
            out.push(Snapshot {
                file: path.to_path_buf(),
                label: String::new(),
                created_at: parsed.created_at,
                content_hash: content_hash(&bytes),
                class: parsed.class,
                location,
                sequence: parsed.sequence,
            });
        }
        out.sort_by_key(Snapshot::age_key);
        Ok(out)
    }

    pub fn latest(&self, path: &Path, class: SnapshotClass) -> Result<Option<Snapshot>, BackupError> {
        Ok(self.list(path)?.into_iter().rev().find(|s| s.class == class))
    }

    pub fn latest_valid(&self, path: &Path) -> Result<Option<Snapshot>, BackupError> {
        self.latest(path, SnapshotClass::Valid)
    }

    /// Standard rollback: restore the confirmed-valid snapshot.
    pub fn rollback(&self, path: &Path) -> Result<Snapshot, BackupError> {
        let valid = self
            .latest_valid(path)?
            .ok_or_else(|| BackupError::unavailable(path, "no confirmed-valid snapshot"))?;
        self.restore(&valid)?;
        Ok(valid)
    }

    /// Emergency rollback: restore a provisional checkpoint.
    pub fn emergency_rollback(&self, provisional: &Snapshot) -> Result<(), BackupError> {
        warn!(
            target: "safe_patcher::backup",
            file = %provisional.file.display(),
            "emergency rollback from provisional snapshot"
        );
        self.restore(provisional)
    }

    /// Standard rollback, then emergency rollback from `provisional` or the
    /// newest TEMP snapshot on disk.
    pub fn recover(&self, path: &Path, provisional: Option<&Snapshot>) -> Result<Snapshot, BackupError> {
        let standard = match self.rollback(path) {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => e,
        };
        debug!(target: "safe_patcher::backup", file = %path.display(), error = %standard, "standard rollback failed");

        let temp = match provisional {
            Some(s) => s.clone(),
            None => self.latest(path, SnapshotClass::Temp)?.ok_or(standard)?,
        };
        self.emergency_rollback(&temp)?;
        Ok(temp)
    }

    /// Remove provisional snapshots older than `max_age` anywhere under the
    /// backup directory. Returns how many were removed.
    pub fn prune_provisional(&self, max_age: Duration) -> Result<usize, BackupError> {
        let now = SystemTime::now();
        let slots = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(BackupError::io(&self.dir, e)),
        };

        let mut removed = 0;
        for slot in slots.flatten() {
            let Ok(entries) = fs::read_dir(slot.path()) else {
                continue;
            };
            for entry in entries.flatten() {
                let location = entry.path();
                if location.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                let is_temp = location
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(snapshot::parse_file_name)
                    .is_some_and(|p| p.class == SnapshotClass::Temp);
                if !is_temp {
                    continue;
                }
                let age = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|mtime| now.duration_since(mtime).ok())
                    .unwrap_or_default();
                if age < max_age {
                    continue;
                }
                match fs::remove_file(&location) {
                    Ok(()) => {
                        self.index.lock().remove(&location);
                        removed += 1;
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(BackupError::io(&location, e)),
                }
            }
        }
        if removed > 0 {
            debug!(target: "safe_patcher::backup", removed, "pruned stale provisional snapshots");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BackupManager, PathBuf) {
        let dir = TempDir::new().unwrap();
        let manager = BackupManager::new(dir.path().join(".backups"));
        let file = dir.path().join("app.py");
        fs::write(&file, "x = 1\n").unwrap();
        (dir, manager, file)
    }

    #[test]
    fn at_most_one_valid_snapshot() {
        let (_dir, manager, file) = setup();
        manager.confirm_valid(&file, "first").unwrap();
        fs::write(&file, "x = 2\n").unwrap();
        let second = manager.confirm_valid(&file, "second").unwrap();

        let valid: Vec<_> = manager
            .list(&file)
            .unwrap()
            .into_iter()
            .filter(|s| s.class == SnapshotClass::Valid)
            .collect();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].location, second.location);
    }

    #[test]
    fn rollback_restores_valid_state() {
        let (_dir, manager, file) = setup();
        manager.confirm_valid(&file, "good").unwrap();
        fs::write(&file, "broken(\n").unwrap();

        manager.rollback(&file).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1\n");
    }

    #[test]
    fn rollback_without_valid_is_unavailable() {
        let (_dir, manager, file) = setup();
        assert!(matches!(manager.rollback(&file), Err(BackupError::Unavailable { .. })));
    }

    #[test]
    fn recover_falls_back_to_provisional() {
        let (_dir, manager, file) = setup();
        let temp = manager.create_provisional(&file, "edit").unwrap();
        fs::write(&file, "garbage").unwrap();

        let used = manager.recover(&file, None).unwrap();
        assert_eq!(used.location, temp.location);
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1\n");
    }

    #[test]
    fn tampered_snapshot_is_detected() {
        let (_dir, manager, file) = setup();
        let snap = manager.create_provisional(&file, "edit").unwrap();
        fs::write(&snap.location, "tampered").unwrap();

        let err = manager.restore(&snap).unwrap_err();
        assert!(matches!(err, BackupError::Corrupted { .. }));
        assert_eq!(fs::read_to_string(&file).unwrap(), "x = 1\n");
    }

    #[test]
    fn same_name_in_different_directories() {
        let dir = TempDir::new().unwrap();
        let manager = BackupManager::new(dir.path().join(".backups"));
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        let a = dir.path().join("a/mod.rs");
        let b = dir.path().join("b/mod.rs");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        manager.confirm_valid(&a, "a").unwrap();
        manager.confirm_valid(&b, "b").unwrap();
        assert_eq!(manager.list(&a).unwrap().len(), 1);
        assert_eq!(manager.list(&b).unwrap().len(), 1);
    }

    #[test]
    fn snapshots_from_previous_process_are_listed() {
        let (dir, manager, file) = setup();
        manager.confirm_valid(&file, "good").unwrap();

        let fresh = BackupManager::new(dir.path().join(".backups"));
        let listed = fresh.list(&file).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].class, SnapshotClass::Valid);
        assert_eq!(listed[0].content_hash, content_hash(b"x = 1\n"));
    }

    #[test]
    fn prune_only_touches_old_provisional() {
        let (_dir, manager, file) = setup();
        manager.create_provisional(&file, "stale").unwrap();
        manager.confirm_valid(&file, "good").unwrap();

        assert_eq!(manager.prune_provisional(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(manager.prune_provisional(Duration::ZERO).unwrap(), 1);

        let left = manager.list(&file).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].class, SnapshotClass::Valid);
    }
}
