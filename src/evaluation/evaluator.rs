//! Model evaluation on a labeled test folder
//!
//! This module provides:
//! - Batched, gradient-free prediction over a complete dataset
//! - Accuracy, per-class precision/recall/F1 and a confusion matrix
//! - Optional CSV/JSON exports of the results

use std::path::PathBuf;
use std::time::Instant;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::backend::Backend,
};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EvaluationConfig;
use crate::dataset::{ImageBatcher, ImageDataset, ImageFolderDataset, Preprocessor};
use crate::model::{load_checkpoint, CarBrandClassifier};
use crate::utils::error::{ClassifierError, Result};
use crate::utils::metrics::Metrics;

/// Result of evaluating one checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub checkpoint: PathBuf,
    pub test_dir: PathBuf,
    pub class_names: Vec<String>,
    pub metrics: Metrics,
    pub avg_batch_time_ms: f64,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationReport {
    /// Overall accuracy in [0, 100]
    pub fn accuracy_percent(&self) -> f64 {
        self.metrics.accuracy_percent()
    }

    pub fn print(&self) {
        println!();
        println!(
            "{} {:.2}%",
            "✅ Test Accuracy:".green().bold(),
            self.accuracy_percent()
        );
        println!();
        println!("{}", "📊 Classification Report:".cyan().bold());
        println!("{}", self.metrics.classification_report());
        println!("{}", "🧩 Confusion Matrix:".cyan().bold());
        println!(
            "{}",
            self.metrics
                .confusion_matrix
                .display(Some(&self.class_names))
        );
    }

    pub fn save_json(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Runs a fixed model over labeled datasets without updating it
pub struct Evaluator<B: Backend> {
    model: CarBrandClassifier<B>,
    class_names: Vec<String>,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(
        model: CarBrandClassifier<B>,
        class_names: Vec<String>,
        batch_size: usize,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            class_names,
            batch_size: batch_size.max(1),
            device,
        }
    }

    /// Predict every item of `dataset` and compare with its label
    ///
    /// Labels must already be expressed in this model's class indices. Every
    /// sample is scored; an image that cannot be decoded fails the evaluation.
    /// Returns the metrics and the mean wall time per batch in milliseconds.
    pub fn evaluate(&self, dataset: &ImageDataset) -> Result<(Metrics, f64)> {
        let batcher = ImageBatcher::<B>::new(dataset.preprocessor().image_size);
        let num_classes = self.class_names.len();

        let mut predictions: Vec<usize> = Vec::with_capacity(dataset.len());
        let mut ground_truth: Vec<usize> = Vec::with_capacity(dataset.len());
        let mut total_time_ms = 0.0;
        let mut batches = 0usize;

        let len = dataset.len();
        for start in (0..len).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(len);
            let items = (start..end)
                .map(|i| {
                    dataset.try_get(i).map_err(|e| {
                        let path = &dataset.samples()[i].0;
                        ClassifierError::Dataset(format!(
                            "Cannot score test image {}: {}",
                            path.display(),
                            e
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            ground_truth.extend(items.iter().map(|item| item.label));
            let batch = batcher.batch(items, &self.device);
            let [batch_len, _, _, _] = batch.images.dims();

            let timer = Instant::now();
            let logits = self.model.forward(batch.images);
            let batch_predictions: Vec<i64> = logits
                .argmax(1)
                .reshape([batch_len])
                .into_data()
                .convert::<i64>()
                .to_vec::<i64>()
                .map_err(|e| ClassifierError::Tensor(format!("{:?}", e)))?;
            total_time_ms += timer.elapsed().as_secs_f64() * 1000.0;
            batches += 1;

            predictions.extend(batch_predictions.into_iter().map(|p| p as usize));
        }

        let avg_batch_time_ms = if batches > 0 {
            total_time_ms / batches as f64
        } else {
            0.0
        };

        info!(
            "Evaluated {} samples in {} batches ({:.1}ms per batch)",
            predictions.len(),
            batches,
            avg_batch_time_ms
        );

        let metrics = Metrics::from_predictions(&predictions, &ground_truth, num_classes)
            .with_class_names(&self.class_names);
        Ok((metrics, avg_batch_time_ms))
    }
}

/// Load a checkpoint, evaluate it on `config.test_dir` and write any exports
pub fn evaluate_checkpoint<B: Backend>(
    config: &EvaluationConfig,
    device: &B::Device,
) -> Result<EvaluationReport> {
    config.validate()?;

    let checkpoint = load_checkpoint::<B>(&config.checkpoint_path, device)?;
    let class_names = checkpoint.class_names;
    info!("Model loaded with classes: {:?}", class_names);

    let test_set = ImageFolderDataset::new(&config.test_dir)?;
    if test_set.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "No test images found in {}",
            config.test_dir.display()
        )));
    }

    let samples = test_set.relabel(&class_names)?;
    let dataset = ImageDataset::new(samples, Preprocessor::new(config.image_size));

    let evaluator = Evaluator::new(
        checkpoint.model,
        class_names.clone(),
        config.batch_size,
        device.clone(),
    );
    let (metrics, avg_batch_time_ms) = evaluator.evaluate(&dataset)?;

    let report = EvaluationReport {
        checkpoint: config.checkpoint_path.clone(),
        test_dir: config.test_dir.clone(),
        class_names,
        metrics,
        avg_batch_time_ms,
        evaluated_at: Utc::now(),
    };

    if let Some(path) = &config.confusion_csv {
        report
            .metrics
            .confusion_matrix
            .save_csv(path, Some(&report.class_names))?;
        info!("Confusion matrix written to {:?}", path);
    }
    if let Some(path) = &config.report_json {
        report.save_json(path)?;
        info!("Evaluation report written to {:?}", path);
    }

    Ok(report)
}
