//! # Car Brand Classifier
//!
//! A Rust library for recognising car brands in photos using the Burn framework.
//!
//! ## Features
//!
//! - **ResNet-18 transfer learning** with a replaced classification head
//! - **Two-phase training**: head-only warm-up, then full fine-tuning
//! - **Evaluation** with per-class precision/recall/F1 and a confusion matrix
//! - **Inference** on single images, shared with the HTTP prediction server
//!
//! ## Modules
//!
//! - `dataset`: Image folder loading, preprocessing, train/val split, Burn batching
//! - `model`: ResNet-18 backbone, brand classifier and checkpoints
//! - `training`: Epoch loops and the two-phase training driver
//! - `evaluation`: Test-set scoring and reports
//! - `inference`: Prediction with a loaded checkpoint
//! - `utils`: Errors, logging and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use car_brand_classifier::{backend::default_device, Predictor};
//!
//! let device = default_device();
//! let predictor = Predictor::<car_brand_classifier::backend::DefaultBackend>::load(
//!     "models/car_brand_model.mpk".as_ref(),
//!     &device,
//! )?;
//! let prediction = predictor.predict_file("car.jpg".as_ref())?;
//! println!("{} ({:.2}%)", prediction.predicted_class, prediction.confidence);
//! ```

pub mod backend;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

#[cfg(test)]
mod test_utils;

// Re-export commonly used items for convenience
pub use config::{load_toml_config, EvaluationConfig, TrainingConfig};
pub use dataset::{ImageFolderDataset, Preprocessor, SplitConfig, TrainValSplit};
pub use evaluation::{evaluate_checkpoint, EvaluationReport};
pub use inference::{Prediction, Predictor};
pub use model::{CarBrandClassifier, ClassifierConfig, TrainMode};
pub use training::{run_training, TrainingSummary};
pub use utils::error::{ClassifierError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Side length of the square model input
pub const IMAGE_SIZE: usize = 224;

/// Training batch size
pub const BATCH_SIZE: usize = 32;

/// Evaluation batch size
pub const EVAL_BATCH_SIZE: usize = 16;

/// Fraction of the dataset held out for validation
pub const VAL_SPLIT: f64 = 0.15;

/// Fixed Adam learning rate for both phases
pub const LEARNING_RATE: f64 = 0.001;

/// Head-only epochs before the backbone is unfrozen
pub const WARMUP_EPOCHS: usize = 5;

/// Full fine-tuning epochs
pub const DEFAULT_EPOCHS: usize = 50;

/// Seed for the split and epoch shuffling
pub const DEFAULT_SEED: u64 = 42;

/// Where training writes and the server reads the model
pub const DEFAULT_CHECKPOINT: &str = "models/car_brand_model.mpk";

pub use dataset::{IMAGENET_MEAN, IMAGENET_STD};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
