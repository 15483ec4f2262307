//! Train/validation split
//!
//! A seeded random permutation assigns every sample to exactly one subset:
//! `val_size = floor(total * validation_fraction)` samples go to validation and
//! the rest to training.

use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{ClassifierError, Result};
use crate::{DEFAULT_SEED, VAL_SPLIT};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of data held out for validation
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: VAL_SPLIT,
            seed: DEFAULT_SEED,
        }
    }
}

impl SplitConfig {
    pub fn new(validation_fraction: f64, seed: u64) -> Result<Self> {
        let config = Self {
            validation_fraction,
            seed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(ClassifierError::Config(
                "Validation fraction must be in [0.0, 1.0)".to_string(),
            ));
        }
        Ok(())
    }

    /// Sizes of the two subsets for `total` samples: `(train, val)`
    pub fn split_sizes(&self, total: usize) -> (usize, usize) {
        let val_size = (total as f64 * self.validation_fraction).floor() as usize;
        (total - val_size, val_size)
    }
}

/// Disjoint train/validation subsets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainValSplit {
    pub train: Vec<(PathBuf, usize)>,
    pub validation: Vec<(PathBuf, usize)>,
}

impl TrainValSplit {
    /// Randomly partition labeled samples
    pub fn from_samples(samples: Vec<(PathBuf, usize)>, config: &SplitConfig) -> Result<Self> {
        config.validate()?;

        let (train_size, _) = config.split_sizes(samples.len());

        let mut shuffled = samples;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        shuffled.shuffle(&mut rng);

        let validation = shuffled.split_off(train_size);

        Ok(Self {
            train: shuffled,
            validation,
        })
    }

    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len()
    }
}
