//! ONNX model loader

use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{info, warn};

/// A classifier session plus the tensor names it is driven through
pub struct LoadedModel {
    pub name: String,
    pub session: Session,
    /// Feature matrix input
    pub input_name: String,
    /// Class probability output
    pub output_name: String,
}

/// Loader for the classifier artifact
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Initialize ONNX Runtime and create a loader using `onnx_threads`
    /// intra-op threads per session (at least one).
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        let onnx_threads = onnx_threads.max(1);
        info!(onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load the classifier from an ONNX file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .context("Model declares no inputs")?;
        if session.inputs.len() > 1 {
            warn!(model = %name, inputs = session.inputs.len(), "Model has extra inputs; only the first is fed");
        }

        let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let output_name = probability_output(&output_names)
            .context("Model declares no outputs")?
            .to_string();

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            output_name,
        })
    }
}

/// Pick the output holding class probabilities. Classifier exports usually
/// emit a label output next to the probability output.
fn probability_output<'a>(names: &[&'a str]) -> Option<&'a str> {
    names
        .iter()
        .find(|name| name.contains("prob"))
        .or_else(|| names.iter().find(|name| !name.contains("label")))
        .or_else(|| names.last())
        .copied()
}

/// Model name derived from the artifact file stem
pub fn model_name_from_path<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}
