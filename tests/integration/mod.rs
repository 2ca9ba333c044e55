//! End-to-end tests through the public service API.

mod properties;
mod scenarios;
mod transaction;

use safe_patcher::{SafePatcher, Settings, Snapshot, SnapshotClass};
use std::path::Path;

/// A service whose backups live under `dir/.backups`.
pub fn patcher_in(dir: &Path) -> SafePatcher {
    let mut settings = Settings::default();
    settings.backup.directory = dir.join(".backups");
    SafePatcher::new(settings)
}

pub fn snapshots_of(patcher: &SafePatcher, file: &Path, class: SnapshotClass) -> Vec<Snapshot> {
    patcher
        .backups()
        .list(file)
        .unwrap()
        .into_iter()
        .filter(|s| s.class == class)
        .collect()
}
