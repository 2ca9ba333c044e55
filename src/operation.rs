//! Request and result types for the single inbound call.

use crate::error::{FailureKind, PatchError};
use crate::matcher::Match;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Search,
    Replace,
    InsertBefore,
    InsertAfter,
    Delete,
    Extract,
}

impl OperationKind {
    /// Search and extract never touch the file.
    pub fn is_read_only(self) -> bool {
        matches!(self, OperationKind::Search | OperationKind::Extract)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Search => "search",
            OperationKind::Replace => "replace",
            OperationKind::InsertBefore => "insert_before",
            OperationKind::InsertAfter => "insert_after",
            OperationKind::Delete => "delete",
            OperationKind::Extract => "extract",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized option keys. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationOptions {
    pub use_regex: bool,
    pub case_sensitive: bool,
    pub language_hint: Option<String>,
    pub preserve_indentation: bool,
    /// Route through the fuzzy matcher (flexible mode)
    pub fuzzy: bool,
    /// Route through the structural matcher
    pub structural: bool,
    /// Replace or delete only the first occurrence
    pub first_only: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            use_regex: false,
            case_sensitive: true,
            language_hint: None,
            preserve_indentation: true,
            fuzzy: false,
            structural: false,
            first_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub path: PathBuf,
    pub pattern: String,
    /// Replacement or inserted text
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub options: OperationOptions,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            pattern: pattern.into(),
            content: String::new(),
            options: OperationOptions::default(),
        }
    }

    pub fn search(path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::new(OperationKind::Search, path, pattern)
    }

    pub fn replace(path: impl Into<PathBuf>, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self::new(OperationKind::Replace, path, pattern).with_content(replacement)
    }

    pub fn insert_before(path: impl Into<PathBuf>, pattern: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(OperationKind::InsertBefore, path, pattern).with_content(content)
    }

    pub fn insert_after(path: impl Into<PathBuf>, pattern: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(OperationKind::InsertAfter, path, pattern).with_content(content)
    }

    pub fn delete(path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, path, pattern)
    }

    pub fn extract(path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::new(OperationKind::Extract, path, pattern)
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    /// Cache label for read-only requests: every input that changes the
    /// match list is part of it.
    pub fn cache_label(&self) -> String {
        let o = &self.options;
        format!(
            "{}|re={}|cs={}|fz={}|st={}|lang={}|{}",
            self.kind,
            o.use_regex as u8,
            o.case_sensitive as u8,
            o.fuzzy as u8,
            o.structural as u8,
            o.language_hint.as_deref().unwrap_or("-"),
            self.pattern
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    PartialSuccess,
    Failure,
    NotSupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub matches: Vec<Match>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    pub mutations_applied: usize,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl OperationResult {
    pub fn success(matches: Vec<Match>) -> Self {
        Self {
            status: OperationStatus::Success,
            matches,
            modified_content: None,
            error: None,
            mutations_applied: 0,
            metadata: Map::new(),
        }
    }

    pub fn failure(error: &PatchError) -> Self {
        let status = match error {
            PatchError::NotSupported { .. } => OperationStatus::NotSupported,
            _ => OperationStatus::Failure,
        };
        Self {
            status,
            matches: Vec::new(),
            modified_content: None,
            error: Some(OperationError {
                kind: error.kind(),
                message: error.to_string(),
            }),
            mutations_applied: 0,
            metadata: Map::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            OperationStatus::Success | OperationStatus::PartialSuccess
        )
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
