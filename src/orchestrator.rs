//! Per-request prediction pipeline.
//!
//! Files are handled strictly in upload order. A file that fails validation
//! is recorded as a [`Rejection`] and the remaining files still run; only
//! unexpected failures (staging I/O, the model itself) abort the request.

use crate::metrics::ServiceMetrics;
use crate::models::InferenceEngine;
use crate::share::ShareCodec;
use crate::types::{FileResult, PredictionRow, UploadedFile};
use crate::uploads::{secure_filename, UploadStore};
use crate::validator::{InputValidator, ValidationError};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A file skipped by validation
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub filename: String,
    pub reason: ValidationError,
}

impl Rejection {
    /// User-facing explanation
    pub fn message(&self) -> String {
        self.reason.to_string()
    }
}

enum FileOutcome {
    Accepted(FileResult),
    Rejected(Rejection),
}

/// Everything one request produced, in upload order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<FileResult>,
    pub rejections: Vec<Rejection>,
}

/// What the request should render
#[derive(Debug, PartialEq)]
pub enum PredictOutcome {
    /// Exactly one file with exactly one row
    Single {
        result: PredictionRow,
        messages: Vec<String>,
    },
    /// Anything else that produced rows
    Batch {
        results: Vec<FileResult>,
        messages: Vec<String>,
    },
    /// No file produced rows
    NoResults { messages: Vec<String> },
}

impl BatchReport {
    pub fn messages(&self) -> Vec<String> {
        self.rejections.iter().map(Rejection::message).collect()
    }

    pub fn into_outcome(mut self) -> PredictOutcome {
        let messages = self.messages();

        if self.results.is_empty() {
            return PredictOutcome::NoResults { messages };
        }

        if self.results.len() == 1 && self.results[0].items.len() == 1 {
            if let Some(result) = self.results.pop().and_then(|mut file| file.items.pop()) {
                return PredictOutcome::Single { result, messages };
            }
        }

        PredictOutcome::Batch {
            results: self.results,
            messages,
        }
    }
}

/// Runs uploaded files through validation, inference and share encoding.
pub struct PredictionService {
    engine: Arc<InferenceEngine>,
    validator: InputValidator,
    codec: ShareCodec,
    uploads: UploadStore,
    metrics: Arc<ServiceMetrics>,
}

impl PredictionService {
    pub fn new(
        engine: Arc<InferenceEngine>,
        codec: ShareCodec,
        uploads: UploadStore,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            engine,
            validator: InputValidator::new(),
            codec,
            uploads,
            metrics,
        }
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn validator(&self) -> &InputValidator {
        &self.validator
    }

    /// Process every file in order; blocking.
    pub fn process(&self, files: &[UploadedFile]) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for file in files {
            match self.process_file(file)? {
                FileOutcome::Accepted(result) => report.results.push(result),
                FileOutcome::Rejected(rejection) => {
                    warn!(
                        file = %rejection.filename,
                        reason = rejection.reason.kind(),
                        "File rejected"
                    );
                    self.metrics.record_rejection(rejection.reason.kind());
                    report.rejections.push(rejection);
                }
            }
        }

        info!(
            files = files.len(),
            accepted = report.results.len(),
            rejected = report.rejections.len(),
            "Upload batch processed"
        );

        Ok(report)
    }

    fn process_file(&self, file: &UploadedFile) -> Result<FileOutcome> {
        let reject = |reason: ValidationError| -> Result<FileOutcome> {
            Ok(FileOutcome::Rejected(Rejection {
                filename: file.name.clone(),
                reason,
            }))
        };

        if let Err(reason) = self.validator.check_file_type(&file.name) {
            return reject(reason);
        }

        // Never empty: the allowed extension survives sanitizing
        let filename = secure_filename(&file.name);

        // Kept on disk until this file is done; validation uses the request's
        // own bytes since a concurrent upload may share the staged path
        let _staged = self.uploads.stage(&filename, &file.content)?;

        let features = match self.validator.validate_content(&filename, &file.content) {
            Ok(features) => features,
            Err(reason) => return reject(reason),
        };
        info!(file = %filename, rows = features.rows(), cols = features.cols(), "Input validated");

        let start = Instant::now();
        let predictions = self.engine.predict(&features)?;
        let elapsed = start.elapsed();

        let confidences: Vec<f64> = predictions.iter().map(|p| p.confidence).collect();
        self.metrics.record_inference(elapsed, &confidences);

        let items = predictions
            .into_iter()
            .enumerate()
            .map(|(i, prediction)| {
                let share_url = self.codec.share_url(&prediction)?;
                Ok(PredictionRow {
                    row_index: i + 1,
                    prediction,
                    share_url,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            file = %filename,
            rows = items.len(),
            inference_us = elapsed.as_micros() as u64,
            "File predicted"
        );

        Ok(FileOutcome::Accepted(FileResult { filename, items }))
    }
}
