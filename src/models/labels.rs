//! Class index to label name mapping

use anyhow::{Context, Result};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("class index {index} out of range for {count} labels")]
    OutOfRange { index: usize, count: usize },
}

/// Fixed mapping from class index to class name, in training order.
#[derive(Debug, Clone)]
pub struct LabelDecoder {
    classes: Vec<String>,
}

impl LabelDecoder {
    pub fn new(classes: Vec<String>) -> Result<Self> {
        if classes.is_empty() {
            anyhow::bail!("Label decoder needs at least one class");
        }
        Ok(Self { classes })
    }

    /// Load class names from a JSON array (`.json`) or a file with one
    /// class name per line.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read label classes from {}", path.display()))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let classes: Vec<String> = if is_json {
            serde_json::from_str(&raw)
                .with_context(|| format!("Invalid label class JSON in {}", path.display()))?
        } else {
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()
        };

        info!(path = %path.display(), classes = classes.len(), "Label classes loaded");
        Self::new(classes)
    }

    pub fn decode(&self, index: usize) -> Result<&str, LabelError> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(LabelError::OutOfRange {
                index,
                count: self.classes.len(),
            })
    }

    /// Number of classes; never zero
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_decode() {
        let decoder = LabelDecoder::new(vec!["BRCA".into(), "LUAD".into()]).unwrap();

        assert_eq!(decoder.decode(1), Ok("LUAD"));
        assert_eq!(
            decoder.decode(2),
            Err(LabelError::OutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert!(LabelDecoder::new(Vec::new()).is_err());
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"["BRCA", "COAD", "LUAD"]"#).unwrap();

        let decoder = LabelDecoder::load(file.path()).unwrap();
        assert_eq!(decoder.class_count(), 3);
        assert_eq!(decoder.decode(0), Ok("BRCA"));
    }

    #[test]
    fn test_load_lines() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "BRCA\n  COAD \n\nLUAD\n").unwrap();

        let decoder = LabelDecoder::load(file.path()).unwrap();
        assert_eq!(decoder.class_count(), 3);
        assert_eq!(decoder.decode(2), Ok("LUAD"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(LabelDecoder::load("/nonexistent/classes.json").is_err());
    }
}
