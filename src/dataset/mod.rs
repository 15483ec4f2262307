//! Dataset module
//!
//! This module provides functionality for:
//! - Scanning an image folder with one sub-directory per class
//! - Deterministic image preprocessing shared with inference
//! - Splitting into disjoint train/validation subsets
//! - Burn Dataset/Batcher integration

pub mod burn_dataset;
pub mod loader;
pub mod preprocess;
pub mod split;

pub use burn_dataset::{ImageBatch, ImageBatcher, ImageDataset, ImageItem};
pub use loader::{is_image_file, DatasetStats, ImageFolderDataset, ImageSample};
pub use preprocess::{Preprocessor, IMAGENET_MEAN, IMAGENET_STD};
pub use split::{SplitConfig, TrainValSplit};
