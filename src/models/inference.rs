//! Batch inference engine for uploaded feature matrices

use crate::config::AppConfig;
use crate::models::labels::LabelDecoder;
use crate::models::loader::{model_name_from_path, LoadedModel, ModelLoader};
use crate::models::ranking;
use crate::types::{FeatureMatrix, Prediction, RankedLabel};
use anyhow::{Context, Result};
use ndarray::Array2;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A model producing class probabilities for a batch of rows.
pub trait Classifier: Send + Sync {
    /// Model name, for logs and health output
    fn name(&self) -> &str;

    /// Class probabilities, shape `(features.rows(), classes)`.
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Array2<f32>>;
}

/// Classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    name: String,
    /// Running a session needs exclusive access
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            name: model.name.clone(),
            model: Mutex::new(model),
        }
    }

    /// Extract the `(rows, classes)` probability block from the model outputs.
    /// Tries the configured output first, then any float tensor that is not a
    /// label output.
    fn extract_probabilities(
        outputs: &ort::session::SessionOutputs,
        output_name: &str,
        rows: usize,
    ) -> Result<Array2<f32>> {
        if let Some(output) = outputs.get(output_name) {
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                return Self::reshape(&dims, data, rows);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                debug!(output = %name, "Extracted probabilities from fallback output");
                return Self::reshape(&dims, data, rows);
            }
        }

        anyhow::bail!("Model produced no float tensor output")
    }

    fn reshape(dims: &[i64], data: &[f32], rows: usize) -> Result<Array2<f32>> {
        let classes = match dims {
            [batch, classes] if *batch as usize == rows => *classes as usize,
            // Some exports drop the batch axis for a single row
            [classes] if rows == 1 => *classes as usize,
            _ => anyhow::bail!("Unexpected probability tensor shape {:?}", dims),
        };

        Array2::from_shape_vec((rows, classes), data.to_vec())
            .context("Probability tensor does not match the input batch")
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Array2<f32>> {
        use ort::value::Tensor;

        let (shape, data) = features.to_tensor_parts();
        let input_tensor =
            Tensor::from_array((shape, data)).context("Failed to create input tensor")?;

        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let output_name = model.output_name.clone();
        let input_name = model.input_name.clone();

        let outputs = model
            .session
            .run(ort::inputs![input_name.as_str() => input_tensor])?;

        Self::extract_probabilities(&outputs, &output_name, features.rows())
    }
}

/// Turns validated feature matrices into ranked predictions.
///
/// Built once at startup and shared read-only by all requests.
pub struct InferenceEngine {
    classifier: Box<dyn Classifier>,
    labels: LabelDecoder,
    top_k: usize,
}

impl InferenceEngine {
    /// Load the ONNX model and label classes named in the configuration
    pub fn new(config: &AppConfig) -> Result<Self> {
        let labels = LabelDecoder::load(&config.model.classes_path)?;

        let loader = ModelLoader::with_threads(config.model.onnx_threads)?;
        let name = model_name_from_path(&config.model.model_path);
        let model = loader.load_model(&config.model.model_path, &name)?;

        info!(
            model = %name,
            classes = labels.class_count(),
            top_k = config.model.top_k,
            "Inference engine initialized"
        );

        Ok(Self::from_parts(
            Box::new(OnnxClassifier::new(model)),
            labels,
            config.model.top_k,
        ))
    }

    /// Assemble an engine from an already-built classifier
    pub fn from_parts(classifier: Box<dyn Classifier>, labels: LabelDecoder, top_k: usize) -> Self {
        Self {
            classifier,
            labels,
            top_k: top_k.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn class_count(&self) -> usize {
        self.labels.class_count()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Run the model once over the whole matrix and rank every row.
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let probabilities = self.classifier.predict_proba(features)?;

        if probabilities.nrows() != features.rows() {
            anyhow::bail!(
                "Model returned {} probability rows for {} input rows",
                probabilities.nrows(),
                features.rows()
            );
        }
        if probabilities.ncols() != self.labels.class_count() {
            anyhow::bail!(
                "Model returned {} classes but {} labels are loaded",
                probabilities.ncols(),
                self.labels.class_count()
            );
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            warn!(model = %self.model_name(), "Model produced non-finite probabilities");
            anyhow::bail!("Model produced non-finite probabilities");
        }

        let predictions = probabilities
            .rows()
            .into_iter()
            .map(|row| {
                let top = ranking::top_k(row, self.top_k)
                    .into_iter()
                    .map(|(index, prob)| {
                        Ok(RankedLabel::new(self.labels.decode(index)?, prob as f64))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Prediction::from_ranked(top))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            model = %self.model_name(),
            rows = features.rows(),
            inference_us = start.elapsed().as_micros() as u64,
            "Batch inference complete"
        );

        Ok(predictions)
    }
}
