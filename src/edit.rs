use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Content hash used for snapshots, cache entries and edit verification.
pub fn content_hash(bytes: &[u8]) -> u64 {
    xxh3_64(bytes)
}

/// The write primitive: byte-span replacement with verification.
///
/// Engines compute mutations in memory; the result reaches disk only through
/// an `Edit`, which re-reads the file and refuses to write if the span no
/// longer holds what the engine saw.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Edit does nothing until apply() is called"]
pub struct Edit {
    pub file: PathBuf,
    /// Starting byte offset (inclusive)
    pub byte_start: usize,
    /// Ending byte offset (exclusive)
    pub byte_end: usize,
    pub new_text: String,
    pub expected_before: EditVerification,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    ExactMatch(String),
    /// xxh3 hash of expected text (used for spans over 1KB)
    Hash(u64),
}

impl EditVerification {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => content_hash(text.as_bytes()) == *expected_hash,
        }
    }

    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(content_hash(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("content changed underneath the edit at {file}:{byte_start}")]
    BeforeTextMismatch {
        file: PathBuf,
        byte_start: usize,
        byte_end: usize,
    },

    #[error("invalid byte range [{byte_start}, {byte_end}) in content of length {len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        len: usize,
    },

    #[error("overlapping edits at byte {at}")]
    Overlap { at: usize },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("edit would create malformed UTF-8")]
    InvalidUtf8Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    Applied { file: PathBuf, bytes_changed: usize },
    /// Current text already equals `new_text`
    AlreadyApplied { file: PathBuf },
}

impl Edit {
    pub fn new(
        file: impl Into<PathBuf>,
        byte_start: usize,
        byte_end: usize,
        new_text: impl Into<String>,
        expected_before: &str,
    ) -> Self {
        Self {
            file: file.into(),
            byte_start,
            byte_end,
            new_text: new_text.into(),
            expected_before: EditVerification::from_text(expected_before),
        }
    }

    /// Replace the entire file, verifying it still holds `original`.
    pub fn whole_file(file: impl Into<PathBuf>, original: &str, new_text: impl Into<String>) -> Self {
        Self::new(file, 0, original.len(), new_text, original)
    }

    fn validate<'a>(&self, content: &'a [u8]) -> Result<&'a str, EditError> {
        if self.byte_start > self.byte_end || self.byte_end > content.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: self.byte_start,
                byte_end: self.byte_end,
                len: content.len(),
            });
        }

        let current_text = std::str::from_utf8(&content[self.byte_start..self.byte_end])?;

        if current_text == self.new_text {
            return Ok(current_text);
        }

        if !self.expected_before.matches(current_text) {
            return Err(EditError::BeforeTextMismatch {
                file: self.file.clone(),
                byte_start: self.byte_start,
                byte_end: self.byte_end,
            });
        }

        Ok(current_text)
    }

    /// Apply this edit to disk atomically (tempfile + fsync + rename), then
    /// bump the mtime so watchers notice.
    pub fn apply(&self) -> Result<EditResult, EditError> {
        let original_content = fs::read(&self.file)?;
        let current_text = self.validate(&original_content)?;

        if current_text == self.new_text {
            return Ok(EditResult::AlreadyApplied {
                file: self.file.clone(),
            });
        }

        let mut new_content = Vec::with_capacity(
            original_content.len() + self.new_text.len() - (self.byte_end - self.byte_start),
        );
        new_content.extend_from_slice(&original_content[..self.byte_start]);
        new_content.extend_from_slice(self.new_text.as_bytes());
        new_content.extend_from_slice(&original_content[self.byte_end..]);

        std::str::from_utf8(&new_content).map_err(|_| EditError::InvalidUtf8Edit)?;

        atomic_write(&self.file, &new_content)?;
        filetime::set_file_mtime(&self.file, filetime::FileTime::now())?;

        Ok(EditResult::Applied {
            file: self.file.clone(),
            bytes_changed: self.new_text.len(),
        })
    }
}

/// Apply several span replacements to in-memory content in one pass.
///
/// Spans may arrive in any order; they are applied bottom-to-top so earlier
/// offsets stay valid. Overlapping spans are rejected.
pub fn splice(content: &str, mut spans: Vec<(Range<usize>, String)>) -> Result<String, EditError> {
    spans.sort_by(|a, b| b.0.start.cmp(&a.0.start).then(b.0.end.cmp(&a.0.end)));

    for window in spans.windows(2) {
        let (later, earlier) = (&window[0].0, &window[1].0);
        if earlier.end > later.start {
            return Err(EditError::Overlap { at: later.start });
        }
    }

    let mut out = content.to_string();
    for (range, text) in spans {
        if range.start > range.end
            || range.end > out.len()
            || !out.is_char_boundary(range.start)
            || !out.is_char_boundary(range.end)
        {
            return Err(EditError::InvalidByteRange {
                byte_start: range.start,
                byte_end: range.end,
                len: out.len(),
            });
        }
        out.replace_range(range, &text);
    }
    Ok(out)
}

/// Atomic file write: tempfile in the same directory, fsync, rename.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_hash_for_large_text() {
        let text = "x".repeat(2000);
        let verify = EditVerification::from_text(&text);
        assert!(matches!(verify, EditVerification::Hash(_)));
        assert!(verify.matches(&text));
        assert!(!verify.matches("y"));
    }

    #[test]
    fn test_edit_validation_invalid_range() {
        let edit = Edit::new("test.txt", 5, 20, "replacement", "");
        assert!(matches!(
            edit.validate(b"hello world"),
            Err(EditError::InvalidByteRange { .. })
        ));
    }

    #[test]
    fn test_apply_span() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        fs::write(&file_path, b"original content").unwrap();

        let result = Edit::new(&file_path, 0, 8, "modified", "original").apply().unwrap();

        assert!(matches!(result, EditResult::Applied { .. }));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "modified content");
    }

    #[test]
    fn test_whole_file_edit_detects_concurrent_change() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("a.py");
        fs::write(&file_path, "x = 1\n").unwrap();

        let edit = Edit::whole_file(&file_path, "x = 1\n", "x = 2\n");
        fs::write(&file_path, "x = 9\n").unwrap();

        assert!(matches!(
            edit.apply(),
            Err(EditError::BeforeTextMismatch { .. }) | Err(EditError::InvalidByteRange { .. })
        ));
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "x = 9\n");
    }

    #[test]
    fn test_whole_file_edit_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("a.py");
        fs::write(&file_path, "x = 2\n").unwrap();

        let edit = Edit::whole_file(&file_path, "x = 1\n", "x = 2\n");
        assert!(matches!(edit.apply().unwrap(), EditResult::AlreadyApplied { .. }));
    }

    #[test]
    fn test_splice_out_of_order() {
        let out = splice(
            "line1\nline2\nline3\n",
            vec![(12..17, "LINE3".into()), (0..5, "LINE1".into()), (6..11, "LINE2".into())],
        )
        .unwrap();
        assert_eq!(out, "LINE1\nLINE2\nLINE3\n");
    }

    #[test]
    fn test_splice_rejects_overlap() {
        let err = splice("abcdef", vec![(0..3, "x".into()), (2..4, "y".into())]).unwrap_err();
        assert!(matches!(err, EditError::Overlap { .. }));
    }
}
