//! Input validation for uploaded feature files.
//!
//! Uploads are comma-separated text whose first line is a header. Every
//! remaining line is one sample of exactly [`FEATURE_COUNT`] numeric
//! features, in the column order the model was trained with.

use crate::types::FeatureMatrix;
use ndarray::Array2;
use thiserror::Error;

/// Number of features per row the model expects
pub const FEATURE_COUNT: usize = 37;

/// Accepted upload extensions (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 2] = ["csv", "txt"];

/// Reason an uploaded file was rejected before inference
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid file type for {filename}. Allowed: CSV, TXT.")]
    InvalidFileType { filename: String },

    #[error("Invalid file format for {filename}. Please ensure the file matches the model input requirements.")]
    InvalidFormat { filename: String },

    #[error("Detected non-numeric or infinite values in {filename}. Please clean the data.")]
    NonFinite { filename: String },

    #[error("Invalid input shape in {filename}. Expected {expected} features per row, but got {actual}.")]
    Shape {
        filename: String,
        expected: usize,
        actual: usize,
    },
}

impl ValidationError {
    /// Short stable name, used as a metrics key
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::InvalidFileType { .. } => "file_type",
            ValidationError::InvalidFormat { .. } => "format",
            ValidationError::NonFinite { .. } => "non_finite",
            ValidationError::Shape { .. } => "shape",
        }
    }
}

/// Layout of a parsed upload before the width check
#[derive(Debug, Clone, PartialEq)]
pub enum InputShape {
    /// Exactly one data row
    SingleRow(Vec<f64>),
    /// Two or more data rows, all the same width
    Matrix(Vec<Vec<f64>>),
    /// No data rows, rows of differing width, or unreadable CSV
    Invalid,
}

impl InputShape {
    fn values(&self) -> Box<dyn Iterator<Item = f64> + '_> {
        match self {
            InputShape::SingleRow(row) => Box::new(row.iter().copied()),
            InputShape::Matrix(rows) => Box::new(rows.iter().flatten().copied()),
            InputShape::Invalid => Box::new(std::iter::empty()),
        }
    }
}

/// Validates uploads against the model's input contract.
pub struct InputValidator {
    feature_count: usize,
}

impl InputValidator {
    /// Create a validator for the production model width.
    pub fn new() -> Self {
        Self::with_feature_count(FEATURE_COUNT)
    }

    pub fn with_feature_count(feature_count: usize) -> Self {
        Self { feature_count }
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// Check the extension of the client-supplied filename.
    pub fn check_file_type(&self, filename: &str) -> Result<(), ValidationError> {
        let allowed = filename
            .rsplit_once('.')
            .map(|(_, ext)| {
                ALLOWED_EXTENSIONS
                    .iter()
                    .any(|allowed| ext.eq_ignore_ascii_case(allowed))
            })
            .unwrap_or(false);

        if allowed {
            Ok(())
        } else {
            Err(ValidationError::InvalidFileType {
                filename: filename.to_string(),
            })
        }
    }

    /// Parse CSV content into the layout it describes.
    ///
    /// The first line is always the header and is skipped, whatever it holds.
    /// Blank, whitespace-only and `#` comment lines after it are ignored.
    /// Empty or non-numeric fields become NaN so the finiteness check reports
    /// them, rather than failing the parse.
    pub fn parse(&self, content: &[u8]) -> InputShape {
        let body = match content.iter().position(|&b| b == b'\n') {
            Some(newline) => &content[newline + 1..],
            None => &[][..],
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(body);

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for record in reader.byte_records() {
            let Ok(record) = record else {
                return InputShape::Invalid;
            };
            // Whitespace-only line
            if record.len() == 1 && record.as_slice().is_empty() {
                continue;
            }
            rows.push(record.iter().map(parse_field).collect());
        }

        let Some(width) = rows.first().map(Vec::len) else {
            return InputShape::Invalid;
        };
        if rows.iter().any(|row| row.len() != width) {
            return InputShape::Invalid;
        }

        if rows.len() == 1 {
            InputShape::SingleRow(rows.remove(0))
        } else {
            InputShape::Matrix(rows)
        }
    }

    /// Validate already-read content; `filename` is only used in messages.
    pub fn validate_content(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Result<FeatureMatrix, ValidationError> {
        let shape = self.parse(content);

        if shape == InputShape::Invalid {
            return Err(ValidationError::InvalidFormat {
                filename: filename.to_string(),
            });
        }

        // Values must also survive narrowing to the model's f32 input
        if !shape.values().all(|v| v.is_finite() && (v as f32).is_finite()) {
            return Err(ValidationError::NonFinite {
                filename: filename.to_string(),
            });
        }

        self.normalize(filename, shape)
    }

    /// Reshape to `(rows, features)` and enforce the feature count.
    pub fn normalize(
        &self,
        filename: &str,
        shape: InputShape,
    ) -> Result<FeatureMatrix, ValidationError> {
        let rows = match shape {
            InputShape::SingleRow(row) => vec![row],
            InputShape::Matrix(rows) => rows,
            InputShape::Invalid => {
                return Err(ValidationError::InvalidFormat {
                    filename: filename.to_string(),
                })
            }
        };

        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width != self.feature_count {
            return Err(ValidationError::Shape {
                filename: filename.to_string(),
                expected: self.feature_count,
                actual: width,
            });
        }

        let n_rows = rows.len();
        let flat: Vec<f32> = rows.into_iter().flatten().map(|v| v as f32).collect();
        Array2::from_shape_vec((n_rows, width), flat)
            .map(FeatureMatrix::from_array)
            .map_err(|_| ValidationError::InvalidFormat {
                filename: filename.to_string(),
            })
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_field(field: &[u8]) -> f64 {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}
