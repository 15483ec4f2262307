//! Burn Dataset Integration
//!
//! Implements Burn's Dataset trait and Batcher for the image folder. Items are
//! produced by the shared [`Preprocessor`], so the batcher only stacks them.

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::warn;

use crate::dataset::preprocess::Preprocessor;
use crate::utils::error::{ClassifierError, Result};

/// A single preprocessed image ready for Burn
#[derive(Clone, Debug)]
pub struct ImageItem {
    /// Normalized image data as flattened CHW float array [3 * H * W]
    pub image: Vec<f32>,
    /// Class label
    pub label: usize,
    /// Image path (for debugging/logging)
    pub path: String,
}

impl ImageItem {
    /// Load and preprocess an image
    pub fn from_path(path: &PathBuf, label: usize, preprocessor: &Preprocessor) -> Result<Self> {
        let image = preprocessor.preprocess_file(path)?;

        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

/// Labeled images implementing Burn's Dataset trait
///
/// Images are either decoded on demand or pre-loaded once with [`Self::new_cached`].
#[derive(Debug, Clone)]
pub struct ImageDataset {
    /// List of (image_path, label) pairs
    samples: Vec<(PathBuf, usize)>,
    preprocessor: Preprocessor,
    cached_items: Option<Vec<ImageItem>>,
}

impl ImageDataset {
    /// Create a lazily loading dataset
    pub fn new(samples: Vec<(PathBuf, usize)>, preprocessor: Preprocessor) -> Self {
        Self {
            samples,
            preprocessor,
            cached_items: None,
        }
    }

    /// Create a dataset with every image decoded up front (in parallel)
    ///
    /// Files that cannot be decoded are skipped with a warning.
    pub fn new_cached(samples: Vec<(PathBuf, usize)>, preprocessor: Preprocessor) -> Self {
        let total = samples.len();

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        let loaded = AtomicUsize::new(0);

        let cached_items: Vec<ImageItem> = samples
            .par_iter()
            .filter_map(|(path, label)| {
                let result = match ImageItem::from_path(path, *label, &preprocessor) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Skipping {:?}: {}", path, e);
                        None
                    }
                };
                let count = loaded.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 50 == 0 || count == total {
                    pb.set_position(count as u64);
                }
                result
            })
            .collect();

        pb.finish_and_clear();

        let loaded_samples: Vec<_> = cached_items
            .iter()
            .map(|item| (PathBuf::from(&item.path), item.label))
            .collect();

        Self {
            samples: loaded_samples,
            preprocessor,
            cached_items: Some(cached_items),
        }
    }

    pub fn samples(&self) -> &[(PathBuf, usize)] {
        &self.samples
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Like [`Dataset::get`], but keeps the reason an item is unavailable
    pub fn try_get(&self, index: usize) -> Result<ImageItem> {
        let out_of_range = || {
            ClassifierError::Dataset(format!(
                "Index {} out of range for {} samples",
                index,
                self.samples.len()
            ))
        };

        if let Some(ref cached) = self.cached_items {
            return cached.get(index).cloned().ok_or_else(out_of_range);
        }

        let (path, label) = self.samples.get(index).ok_or_else(out_of_range)?;
        ImageItem::from_path(path, *label, &self.preprocessor)
    }
}

impl Dataset<ImageItem> for ImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        if index >= self.samples.len() {
            return None;
        }
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images
#[derive(Clone, Debug)]
pub struct ImageBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks preprocessed items into tensors
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    image_size: usize,
    _backend: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ImageBatch { images, targets }
    }
}
