//! Training loop building blocks
//!
//! [`Trainer`] owns the model being optimized and runs single epochs over a
//! dataset; [`TrainingState`] decides which epochs improved on the best
//! validation accuracy and therefore must be checkpointed.

use std::path::{Path, PathBuf};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Int, Tensor},
};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{ImageBatcher, ImageDataset};
use crate::model::{CarBrandClassifier, TrainMode};
use crate::utils::error::Result;
use crate::utils::metrics::{AccuracyTracker, RunningAverage};

/// The two sequential phases of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Backbone frozen, only the head learns
    Warmup,
    /// Every parameter learns with a fresh optimizer
    FineTune,
}

impl Phase {
    pub fn mode(&self) -> TrainMode {
        match self {
            Phase::Warmup => TrainMode::Frozen,
            Phase::FineTune => TrainMode::Full,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Warmup => "Classifier Epoch",
            Phase::FineTune => "Full Model Epoch",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Warmup => write!(f, "warmup"),
            Phase::FineTune => write!(f, "fine-tune"),
        }
    }
}

/// Metrics of one completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub phase: Phase,
    /// 1-based epoch within its phase
    pub epoch: usize,
    /// Mean cross-entropy over the epoch's batches
    pub train_loss: f64,
    /// Fraction of training samples predicted correctly during the epoch
    pub train_accuracy: f64,
    /// Fraction of validation samples predicted correctly after the epoch
    pub val_accuracy: f64,
    /// Whether this epoch set a new best (and was checkpointed)
    pub improved: bool,
    pub finished_at: DateTime<Utc>,
}

impl EpochMetrics {
    pub fn new(
        phase: Phase,
        epoch: usize,
        train_loss: f64,
        train_accuracy: f64,
        val_accuracy: f64,
    ) -> Self {
        Self {
            phase,
            epoch,
            train_loss,
            train_accuracy,
            val_accuracy,
            improved: false,
            finished_at: Utc::now(),
        }
    }
}

/// Best-so-far tracking shared by both phases
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingState {
    pub best_val_accuracy: f64,
    /// Index into `history` of the best epoch
    pub best_epoch: Option<usize>,
    pub history: Vec<EpochMetrics>,
}

impl TrainingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an epoch; returns `true` when it strictly beats the best so far
    pub fn record_epoch(&mut self, mut metrics: EpochMetrics) -> bool {
        let improved = metrics.val_accuracy > self.best_val_accuracy;
        metrics.improved = improved;

        if improved {
            self.best_val_accuracy = metrics.val_accuracy;
            self.best_epoch = Some(self.history.len());
        }

        self.history.push(metrics);
        improved
    }

    pub fn epochs_completed(&self) -> usize {
        self.history.len()
    }

    pub fn best(&self) -> Option<&EpochMetrics> {
        self.best_epoch.and_then(|idx| self.history.get(idx))
    }
}

/// Outcome of a complete training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub best_val_accuracy: f64,
    /// Written checkpoint, `None` if no epoch ever improved on 0.0
    pub checkpoint_path: Option<PathBuf>,
    pub history: Vec<EpochMetrics>,
    pub train_samples: usize,
    pub val_samples: usize,
    pub class_names: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TrainingSummary {
    /// Write the summary as pretty JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Number of predictions in `logits` that match `targets`
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// Runs epochs over a fixed model, device and batch layout
pub struct Trainer<B: AutodiffBackend> {
    pub model: CarBrandClassifier<B>,
    learning_rate: f64,
    batch_size: usize,
    device: B::Device,
    batcher: ImageBatcher<B>,
    rng: ChaCha8Rng,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(
        model: CarBrandClassifier<B>,
        learning_rate: f64,
        batch_size: usize,
        image_size: usize,
        seed: u64,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            learning_rate,
            batch_size,
            device,
            batcher: ImageBatcher::new(image_size),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// One pass over the shuffled training set
    ///
    /// Returns `(mean loss, accuracy)`.
    pub fn train_epoch<O>(
        &mut self,
        optimizer: &mut O,
        dataset: &ImageDataset,
        mode: TrainMode,
    ) -> (f64, f64)
    where
        O: Optimizer<CarBrandClassifier<B>, B>,
    {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        indices.shuffle(&mut self.rng);

        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let num_batches = indices.len().div_ceil(self.batch_size);

        let mut loss_avg = RunningAverage::new();
        let mut accuracy = AccuracyTracker::new();

        for (batch_idx, chunk) in indices.chunks(self.batch_size).enumerate() {
            let items: Vec<_> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch = self.batcher.batch(items, &self.device);
            let batch_len = batch.targets.dims()[0];

            let output = self.model.forward_with_mode(batch.images, mode);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            loss_avg.add(loss_value);
            accuracy.add_counts(count_correct(output, batch.targets), batch_len);

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = optimizer.step(self.learning_rate, self.model.clone(), grads);

            if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "  Batch {}/{}: loss = {:.4}, acc = {:.2}%",
                    batch_idx + 1,
                    num_batches,
                    loss_value,
                    100.0 * accuracy.accuracy()
                );
            }
        }

        (loss_avg.average(), accuracy.accuracy())
    }

    /// Accuracy on a held-out set using the non-autodiff copy of the model
    pub fn validate(&self, dataset: &ImageDataset) -> f64 {
        let model = self.model.valid();
        let batcher = ImageBatcher::<B::InnerBackend>::new(dataset.preprocessor().image_size);

        let mut accuracy = AccuracyTracker::new();

        let len = dataset.len();
        for start in (0..len).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(len);
            let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch = batcher.batch(items, &self.device);
            let batch_len = batch.targets.dims()[0];
            let output = model.forward(batch.images);
            accuracy.add_counts(count_correct(output, batch.targets), batch_len);
        }

        accuracy.accuracy()
    }
}
