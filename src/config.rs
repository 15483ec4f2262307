//! Run configuration
//!
//! Training and evaluation settings. Both can be read from a TOML file with
//! [`load_toml_config`]; missing keys fall back to the defaults below and the
//! CLI applies its flags on top.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::DEFAULT_PRETRAINED;
use crate::utils::error::{ClassifierError, Result};
use crate::{
    BATCH_SIZE, DEFAULT_CHECKPOINT, DEFAULT_EPOCHS, DEFAULT_SEED, EVAL_BATCH_SIZE, IMAGE_SIZE,
    LEARNING_RATE, VAL_SPLIT, WARMUP_EPOCHS,
};

/// Settings for a two-phase training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Image folder with one sub-directory per brand
    pub data_dir: PathBuf,
    /// Where the best checkpoint is written
    pub checkpoint_path: PathBuf,
    /// Epochs of full fine-tuning
    pub epochs: usize,
    /// Epochs of head-only warm-up before fine-tuning
    pub warmup_epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Fraction of the dataset held out for validation
    pub val_split: f64,
    pub seed: u64,
    pub image_size: usize,
    /// Backbone weights to start from (torchvision `.pth` or Burn record);
    /// `None` trains the backbone from random init
    pub pretrained_path: Option<PathBuf>,
    /// Run the frozen-backbone warm-up phase
    pub freeze_base: bool,
    /// Decode every image once before training instead of once per epoch
    pub cache_images: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT),
            epochs: DEFAULT_EPOCHS,
            warmup_epochs: WARMUP_EPOCHS,
            batch_size: BATCH_SIZE,
            learning_rate: LEARNING_RATE,
            val_split: VAL_SPLIT,
            seed: DEFAULT_SEED,
            image_size: IMAGE_SIZE,
            pretrained_path: Some(PathBuf::from(DEFAULT_PRETRAINED)),
            freeze_base: true,
            cache_images: true,
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClassifierError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if !(self.learning_rate > 0.0) {
            return Err(ClassifierError::Config(
                "learning_rate must be positive".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.val_split) {
            return Err(ClassifierError::Config(
                "val_split must be in range [0.0, 1.0)".to_string(),
            ));
        }

        if self.image_size < 32 {
            return Err(ClassifierError::Config(
                "image_size must be at least 32".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of warm-up epochs that will actually run
    pub fn effective_warmup_epochs(&self) -> usize {
        if self.freeze_base {
            self.warmup_epochs
        } else {
            0
        }
    }

    /// Path of the JSON training history written next to the checkpoint
    pub fn history_path(&self) -> PathBuf {
        let stem = self
            .checkpoint_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "model".to_string());
        self.checkpoint_path
            .with_file_name(format!("{}_history.json", stem))
    }
}

/// Settings for evaluating a checkpoint on a test folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub test_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub batch_size: usize,
    pub image_size: usize,
    /// Optional CSV export of the confusion matrix
    pub confusion_csv: Option<PathBuf>,
    /// Optional JSON export of the full report
    pub report_json: Option<PathBuf>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_dir: PathBuf::from("test"),
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT),
            batch_size: EVAL_BATCH_SIZE,
            image_size: IMAGE_SIZE,
            confusion_csv: None,
            report_json: None,
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ClassifierError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.image_size < 32 {
            return Err(ClassifierError::Config(
                "image_size must be at least 32".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a TOML configuration file
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path).map_err(|e| {
        ClassifierError::Config(format!("Failed to read config {}: {e}", path.display()))
    })?;

    toml::from_str(&content).map_err(|e| {
        ClassifierError::Config(format!("Failed to parse config {}: {e}", path.display()))
    })
}
