//! Model module
//!
//! ResNet-18 backbone, the brand classifier built on it, and checkpoint I/O.

pub mod checkpoint;
pub mod classifier;
pub mod resnet;
pub mod weights;

pub use checkpoint::{
    checkpoint_file, load_checkpoint, load_checkpoint_expecting, save_checkpoint, CheckpointRecord,
    LoadedCheckpoint,
};
pub use classifier::{CarBrandClassifier, CarBrandClassifierRecord, ClassifierConfig, TrainMode};
pub use resnet::{BasicBlock, ResNet18, ResNet18Record, FEATURE_DIM};
pub use weights::{PretrainedWeights, DEFAULT_PRETRAINED, RESNET18_IMAGENET1K_V1};
