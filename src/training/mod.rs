//! Training module
//!
//! This module provides:
//! - Epoch-level training and validation loops over Burn datasets
//! - Best-model tracking with strict-improvement checkpointing
//! - The two-phase (warm-up, then full fine-tuning) driver

pub mod supervised;
pub mod trainer;

pub use supervised::run_training;
pub use trainer::{EpochMetrics, Phase, Trainer, TrainingState, TrainingSummary};
