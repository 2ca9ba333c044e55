use crate::config::schema::{Settings, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a settings file.
pub const CONFIG_ENV: &str = "SAFE_PATCHER_CONFIG";
/// Settings file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "safe-patcher.toml";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read settings from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(f, "failed to parse settings TOML ({}): {}", path.display(), source),
                None => write!(f, "failed to parse settings TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid settings ({}): {}", path.display(), source),
                None => write!(f, "invalid settings: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<Settings, ConfigError> {
    let settings: Settings =
        toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml { path: None, source })?;
    settings
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(settings)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Settings from, in order: `explicit`, `$SAFE_PATCHER_CONFIG`,
/// `./safe-patcher.toml` when present, else defaults.
pub fn discover(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Some(path) = explicit {
        return load_from_path(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return load_from_path(PathBuf::from(path));
    }
    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        return load_from_path(local);
    }
    Ok(Settings::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;
    use crate::matcher::FuzzyMode;
    use std::time::Duration;

    #[test]
    fn empty_input_yields_defaults() {
        let settings = load_from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.provisional_retention(), Duration::from_secs(3600));
        assert_eq!(settings.matcher_config().fuzzy_threshold, 0.6);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let settings = load_from_str(
            r#"
[backup]
directory = "/tmp/snaps"

[cache]
ttl_secs = 0

[matching]
fuzzy_mode = "exact"

[logging]
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(settings.backup.directory, PathBuf::from("/tmp/snaps"));
        assert_eq!(settings.backup.provisional_retention_secs, 3600);
        assert_eq!(settings.cache_ttl(), None);
        assert_eq!(settings.cache.capacity, 512);
        assert_eq!(settings.matching.fuzzy_mode, FuzzyMode::Exact);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = load_from_str("[cache]\nsize = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn validation_collects_every_issue() {
        let err = load_from_str("[cache]\ncapacity = 0\n[matching]\nfuzzy_threshold = 1.5\n").unwrap_err();
        match err {
            ConfigError::Validation { source, .. } => assert_eq!(source.issues.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn path_is_attached_to_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("bad.toml");
        fs::write(&file, "[cache\n").unwrap();
        let err = load_from_path(&file).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn explicit_path_wins_discovery() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("s.toml");
        fs::write(&file, "[cache]\ncapacity = 7\n").unwrap();
        assert_eq!(discover(Some(&file)).unwrap().cache.capacity, 7);
    }
}
