use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub(crate) const EXTENSION: &str = "backup";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotClass {
    /// Last state known to pass validation. At most one per file.
    Valid,
    /// Provisional checkpoint for a single in-flight operation.
    Temp,
    /// Taken for transaction participants.
    Generic,
}

impl SnapshotClass {
    pub fn tag(self) -> &'static str {
        match self {
            SnapshotClass::Valid => "VALID",
            SnapshotClass::Temp => "TEMP",
            SnapshotClass::Generic => "backup",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "VALID" => Some(SnapshotClass::Valid),
            "TEMP" => Some(SnapshotClass::Temp),
            "backup" => Some(SnapshotClass::Generic),
            _ => None,
        }
    }
}

impl fmt::Display for SnapshotClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Descriptor of one backup file. The bytes live at `location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// File the snapshot was taken of
    pub file: PathBuf,
    pub label: String,
    pub created_at: DateTime<Utc>,
    /// xxh3 of the snapshot bytes
    pub content_hash: u64,
    pub class: SnapshotClass,
    pub location: PathBuf,
    /// Process-wide sequence number; orders snapshots sharing a timestamp.
    pub sequence: u64,
}

impl Snapshot {
    /// Ordering key, oldest first.
    pub fn age_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

/// `<file_name>_<TAG>_<YYYYmmdd>_<HHMMSS>_<nanos>_<seq>.backup`
pub(crate) fn file_name(file_name: &str, class: SnapshotClass, at: DateTime<Utc>, sequence: u64) -> String {
    format!(
        "{file_name}_{}_{}_{sequence:06}.{EXTENSION}",
        class.tag(),
        at.format(TIMESTAMP_FORMAT)
    )
}

/// Fields encoded in a backup file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedName {
    pub owner: String,
    pub class: SnapshotClass,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

pub(crate) fn parse_file_name(name: &str) -> Option<ParsedName> {
    let stem = name.strip_suffix(EXTENSION)?.strip_suffix('.')?;
    // Owner names may contain underscores; split from the right.
    let mut parts = stem.rsplitn(6, '_');
    let sequence = parts.next()?.parse().ok()?;
    let nanos: i64 = parts.next()?.parse().ok()?;
    let time = parts.next()?;
    let date = parts.next()?;
    let class = SnapshotClass::from_tag(parts.next()?)?;
    let owner = parts.next()?.to_string();

    let naive = NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S").ok()?;
    let created_at = naive.and_utc() + TimeDelta::nanoseconds(nanos);
    Some(ParsedName {
        owner,
        class,
        created_at,
        sequence,
    })
}
