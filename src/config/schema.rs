use crate::matcher::{FuzzyMode, MatcherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub backup: BackupSettings,
    pub cache: CacheSettings,
    pub matching: MatchingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSettings {
    pub directory: PathBuf,
    /// Provisional snapshots older than this are pruned.
    pub provisional_retention_secs: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".safe-patcher/backups"),
            provisional_retention_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub capacity: usize,
    /// 0 disables expiry
    pub ttl_secs: u64,
    pub max_file_bytes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 512,
            ttl_secs: 300,
            max_file_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MatchingSettings {
    pub fuzzy_threshold: f64,
    pub fuzzy_mode: FuzzyMode,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        let defaults = MatcherConfig::default();
        Self {
            fuzzy_threshold: defaults.fuzzy_threshold,
            fuzzy_mode: defaults.fuzzy_mode,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "safe_patcher=info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.backup.directory.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField {
                section: "backup",
                field: "directory",
            });
        }
        if self.cache.capacity == 0 {
            issues.push(ValidationIssue::OutOfRange {
                section: "cache",
                field: "capacity",
                message: "must be at least 1".to_string(),
            });
        }
        let threshold = self.matching.fuzzy_threshold;
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            issues.push(ValidationIssue::OutOfRange {
                section: "matching",
                field: "fuzzy_threshold",
                message: format!("{threshold} is outside 0.0..=1.0"),
            });
        }
        if self.logging.filter.trim().is_empty() {
            issues.push(ValidationIssue::MissingField {
                section: "logging",
                field: "filter",
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn provisional_retention(&self) -> Duration {
        Duration::from_secs(self.backup.provisional_retention_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        match self.cache.ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            fuzzy_threshold: self.matching.fuzzy_threshold,
            fuzzy_mode: self.matching.fuzzy_mode,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    OutOfRange {
        section: &'static str,
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { section, field } => {
                write!(f, "[{section}] {field} must not be empty")
            }
            ValidationIssue::OutOfRange {
                section,
                field,
                message,
            } => write!(f, "[{section}] {field}: {message}"),
        }
    }
}
