//! Genomic Predictor Library
//!
//! Web service that classifies uploaded genomic feature files with an ONNX
//! model and hands out signed, stateless links to individual results.

pub mod config;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod server;
pub mod share;
pub mod types;
pub mod uploads;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use models::inference::InferenceEngine;
pub use orchestrator::{PredictOutcome, PredictionService};
pub use share::ShareCodec;
pub use types::{FileResult, Prediction, PredictionRow};
pub use validator::InputValidator;
