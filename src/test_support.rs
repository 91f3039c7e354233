//! Stub classifiers and fixtures shared by unit tests

use crate::models::{Classifier, InferenceEngine, LabelDecoder};
use crate::types::FeatureMatrix;
use crate::validator::FEATURE_COUNT;
use anyhow::Result;
use ndarray::Array2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const TEST_CLASSES: [&str; 4] = ["BRCA", "COAD", "LUAD", "PRAD"];
pub const TEST_DISTRIBUTION: [f32; 4] = [0.1, 0.6, 0.05, 0.25];

/// Returns canned probabilities and counts how often it was invoked.
pub struct FixedClassifier {
    rows: Vec<Vec<f32>>,
    repeat: bool,
    calls: Arc<AtomicUsize>,
}

impl FixedClassifier {
    /// Always return exactly these rows
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self {
            rows,
            repeat: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Return `distribution` for every input row
    pub fn repeating(distribution: Vec<f32>) -> Self {
        Self {
            rows: vec![distribution],
            repeat: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Array2<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let rows = if self.repeat {
            vec![self.rows[0].clone(); features.rows()]
        } else {
            self.rows.clone()
        };
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let n_rows = rows.len();
        Ok(Array2::from_shape_vec(
            (n_rows, width),
            rows.into_iter().flatten().collect(),
        )?)
    }
}

/// Always fails, like a model whose runtime broke.
pub struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    fn predict_proba(&self, _features: &FeatureMatrix) -> Result<Array2<f32>> {
        anyhow::bail!("session run failed")
    }
}

pub fn labels(names: &[&str]) -> LabelDecoder {
    LabelDecoder::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
}

/// `rows` x `FEATURE_COUNT` matrix of small distinct values
pub fn feature_matrix(rows: usize) -> FeatureMatrix {
    FeatureMatrix::from_array(Array2::from_shape_fn((rows, FEATURE_COUNT), |(r, c)| {
        r as f32 + c as f32 * 0.01
    }))
}

/// Engine over [`TEST_CLASSES`] that returns [`TEST_DISTRIBUTION`] per row,
/// plus its invocation counter.
pub fn test_engine() -> (InferenceEngine, Arc<AtomicUsize>) {
    let classifier = FixedClassifier::repeating(TEST_DISTRIBUTION.to_vec());
    let calls = classifier.calls();
    (
        InferenceEngine::from_parts(Box::new(classifier), labels(&TEST_CLASSES), 3),
        calls,
    )
}

/// CSV text: a header line plus `rows` rows of `width` numbers
pub fn csv_content(rows: usize, width: usize) -> Vec<u8> {
    let header: Vec<String> = (1..=width).map(|i| format!("gene_{}", i)).collect();
    let mut out = header.join(",");
    for r in 0..rows {
        let row: Vec<String> = (0..width)
            .map(|c| format!("{:.2}", r as f64 + c as f64 * 0.01))
            .collect();
        out.push('\n');
        out.push_str(&row.join(","));
    }
    out.push('\n');
    out.into_bytes()
}
