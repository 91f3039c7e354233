//! Staging area for uploaded files.
//!
//! Each accepted upload is written under its sanitized name for as long as it
//! is being processed. Two requests uploading the same name at the same time
//! write the same path, so the staged copy is never read back.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Reduce a client-supplied filename to a safe single path component.
///
/// Non-ASCII characters are dropped, separators and whitespace runs become
/// `_`, anything outside `[A-Za-z0-9_.-]` is removed, and leading or trailing
/// `.`/`_` are stripped. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    ascii
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Directory where uploads are staged
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    keep: bool,
}

impl UploadStore {
    /// Create the store, making the directory if needed
    pub fn create<P: AsRef<Path>>(dir: P, keep: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;
        Ok(Self { dir, keep })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `content` under the already-sanitized `filename`.
    pub fn stage(&self, filename: &str, content: &[u8]) -> Result<StagedUpload> {
        let path = self.dir.join(filename);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to save upload to {}", path.display()))?;
        debug!(path = %path.display(), bytes = content.len(), "Upload staged");

        Ok(StagedUpload {
            path,
            keep: self.keep,
        })
    }
}

/// A staged file; removed from disk when dropped unless uploads are kept
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    keep: bool,
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}
