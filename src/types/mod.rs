//! Type definitions for the prediction pipeline

pub mod matrix;
pub mod prediction;
pub mod upload;

pub use matrix::FeatureMatrix;
pub use prediction::{FileResult, Prediction, PredictionRow, RankedLabel};
pub use upload::UploadedFile;
