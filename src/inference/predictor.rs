//! Inference Predictor Module
//!
//! Turns a single image into a brand prediction with a loaded classifier.
//! The same [`Preprocessor`] used during training prepares the input, so an
//! image is seen identically at training and inference time.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Preprocessor;
use crate::model::{load_checkpoint_expecting, CarBrandClassifier};
use crate::utils::error::{ClassifierError, Result};

/// Probability assigned to one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub class_index: usize,
    pub class_name: String,
    /// Percentage in [0, 100]
    pub confidence: f32,
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Path to the input image (if applicable)
    pub image_path: Option<PathBuf>,
    pub class_index: usize,
    /// One of the checkpoint's class names
    pub predicted_class: String,
    /// Softmax probability of the predicted class as a percentage, 2 decimals
    pub confidence: f32,
    /// Every class in index order
    pub scores: Vec<ClassScore>,
    pub inference_time_ms: f64,
}

/// Probability in [0, 1] to a percentage rounded to 2 decimals
pub fn to_percent(probability: f32) -> f32 {
    ((probability as f64 * 10_000.0).round() / 100.0) as f32
}

impl Prediction {
    fn from_probabilities(probabilities: &[f32], class_names: &[String]) -> Result<Self> {
        if probabilities.len() != class_names.len() {
            return Err(ClassifierError::ClassCountMismatch {
                expected: class_names.len(),
                found: probabilities.len(),
            });
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::Unexpected(
                "Model produced non-finite probabilities".to_string(),
            ));
        }

        let mut best = 0usize;
        for (idx, &p) in probabilities.iter().enumerate() {
            if p > probabilities[best] {
                best = idx;
            }
        }

        let scores: Vec<ClassScore> = probabilities
            .iter()
            .zip(class_names)
            .enumerate()
            .map(|(class_index, (&p, name))| ClassScore {
                class_index,
                class_name: name.clone(),
                confidence: to_percent(p),
            })
            .collect();

        Ok(Self {
            image_path: None,
            class_index: best,
            predicted_class: class_names[best].clone(),
            confidence: to_percent(probabilities[best]),
            scores,
            inference_time_ms: 0.0,
        })
    }

    /// The `k` most likely classes, most likely first
    pub fn top_k(&self, k: usize) -> Vec<ClassScore> {
        let mut ranked = self.scores.clone();
        ranked.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.class_index.cmp(&b.class_index))
        });
        ranked.truncate(k);
        ranked
    }

    /// Pretty print the prediction result
    pub fn display(&self, k: usize) -> String {
        let mut output = String::new();

        if let Some(path) = &self.image_path {
            output.push_str(&format!("Image: {:?}\n", path));
        }
        output.push_str(&format!(
            "Prediction: {} (class {})\n",
            self.predicted_class, self.class_index
        ));
        output.push_str(&format!("Confidence: {:.2}%\n", self.confidence));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        if k > 1 {
            output.push_str(&format!("\nTop-{} predictions:\n", k));
            for (i, score) in self.top_k(k).iter().enumerate() {
                output.push_str(&format!(
                    "  {}. {} - {:.2}%\n",
                    i + 1,
                    score.class_name,
                    score.confidence
                ));
            }
        }

        output
    }
}

/// A loaded classifier plus everything needed to decode its output
#[derive(Debug)]
pub struct Predictor<B: Backend> {
    model: CarBrandClassifier<B>,
    class_names: Vec<String>,
    preprocessor: Preprocessor,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Wrap an in-memory model
    ///
    /// Fails with [`ClassifierError::ClassCountMismatch`] when the model's head
    /// does not have one output per class name.
    pub fn new(
        model: CarBrandClassifier<B>,
        class_names: Vec<String>,
        preprocessor: Preprocessor,
        device: B::Device,
    ) -> Result<Self> {
        let found = model.num_classes();
        if class_names.is_empty() || found != class_names.len() {
            return Err(ClassifierError::ClassCountMismatch {
                expected: class_names.len(),
                found,
            });
        }

        Ok(Self {
            model,
            class_names,
            preprocessor,
            device,
        })
    }

    /// Load a checkpoint with the default 224x224 preprocessing
    pub fn load(checkpoint: &Path, device: &B::Device) -> Result<Self> {
        Self::load_with_config(checkpoint, Preprocessor::default(), None, device)
    }

    /// Load a checkpoint with custom preprocessing and an optional required class count
    pub fn load_with_config(
        checkpoint: &Path,
        preprocessor: Preprocessor,
        expected_classes: Option<usize>,
        device: &B::Device,
    ) -> Result<Self> {
        let loaded = load_checkpoint_expecting::<B>(checkpoint, expected_classes, device)?;
        Self::new(loaded.model, loaded.class_names, preprocessor, device.clone())
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Predict the brand of a decoded image
    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction> {
        let start = Instant::now();
        let input = self.preprocessor.preprocess(image);
        let size = self.preprocessor.image_size;

        let tensor = Tensor::<B, 4>::from_floats(
            TensorData::new(input, [1, 3, size, size]),
            &self.device,
        );

        let probabilities: Vec<f32> = self
            .model
            .forward_softmax(tensor)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ClassifierError::Tensor(format!("{:?}", e)))?;

        let mut prediction = Prediction::from_probabilities(&probabilities, &self.class_names)?;
        prediction.inference_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            "Predicted {} ({:.2}%) in {:.1}ms",
            prediction.predicted_class, prediction.confidence, prediction.inference_time_ms
        );
        Ok(prediction)
    }

    /// Predict from encoded image bytes (e.g. an upload)
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = self.preprocessor.decode(bytes)?;
        self.predict_image(&image)
    }

    /// Predict from an image file
    pub fn predict_file(&self, path: &Path) -> Result<Prediction> {
        let image = self.preprocessor.load(path)?;
        let mut prediction = self.predict_image(&image)?;
        prediction.image_path = Some(path.to_path_buf());
        Ok(prediction)
    }
}
