//! ML model inference components

pub mod inference;
pub mod labels;
pub mod loader;
pub mod ranking;

pub use inference::{Classifier, InferenceEngine, OnnxClassifier};
pub use labels::LabelDecoder;
pub use loader::ModelLoader;
