//! Prediction result data structures

use serde::{Deserialize, Serialize};

/// One ranked class with its probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    pub confidence: f64,
}

impl RankedLabel {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Top-1 prediction plus the ranked runners-up for a single row.
///
/// This is also the payload carried by share tokens, so every field has a
/// default: a signed token with missing fields still decodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Prediction {
    /// Most probable class name
    #[serde(rename = "prediction")]
    pub label: String,

    /// Probability of the most probable class (0.0 - 1.0)
    pub confidence: f64,

    /// Highest-probability classes, descending
    #[serde(rename = "top3")]
    pub top: Vec<RankedLabel>,
}

impl Prediction {
    /// Build a prediction from ranked labels; the first entry is the top-1.
    pub fn from_ranked(top: Vec<RankedLabel>) -> Self {
        let (label, confidence) = top
            .first()
            .map(|r| (r.label.clone(), r.confidence))
            .unwrap_or_default();

        Self {
            label,
            confidence,
            top,
        }
    }
}

/// Prediction for one row of an uploaded file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    /// 1-based row number within the file
    pub row_index: usize,

    #[serde(flatten)]
    pub prediction: Prediction,

    /// Relative URL of the shareable result page
    pub share_url: String,
}

/// All row predictions for one uploaded file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    /// Sanitized filename
    pub filename: String,
    pub items: Vec<PredictionRow>,
}
