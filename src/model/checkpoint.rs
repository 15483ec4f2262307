//! Checkpoint persistence
//!
//! A checkpoint bundles the classifier weights with the ordered class names,
//! so a model is never separated from the meaning of its outputs. Files are
//! written with Burn's named MessagePack recorder at full precision.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder},
    tensor::backend::Backend,
};
use tracing::info;

use super::classifier::{CarBrandClassifier, CarBrandClassifierRecord, ClassifierConfig};
use crate::utils::error::{ClassifierError, Result};

/// On-disk checkpoint contents
#[derive(Record)]
pub struct CheckpointRecord<B: Backend> {
    pub model_state: CarBrandClassifierRecord<B>,
    pub class_names: Vec<String>,
}

/// A checkpoint restored into a ready-to-use model
#[derive(Debug)]
pub struct LoadedCheckpoint<B: Backend> {
    pub model: CarBrandClassifier<B>,
    pub class_names: Vec<String>,
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
}

/// File the recorder actually reads and writes for `path`
pub fn checkpoint_file(path: &Path) -> PathBuf {
    path.with_extension("mpk")
}

/// Save model weights together with the class names
///
/// Returns the path of the written file.
pub fn save_checkpoint<B: Backend>(
    model: &CarBrandClassifier<B>,
    class_names: &[String],
    path: &Path,
) -> Result<PathBuf> {
    let found = model.num_classes();
    if found != class_names.len() {
        return Err(ClassifierError::ClassCountMismatch {
            expected: class_names.len(),
            found,
        });
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let record = CheckpointRecord {
        model_state: model.clone().into_record(),
        class_names: class_names.to_vec(),
    };

    Recorder::<B>::record(&recorder(), record, path.to_path_buf()).map_err(|e| {
        ClassifierError::Checkpoint(format!("Failed to save {}: {:?}", path.display(), e))
    })?;

    let file = checkpoint_file(path);
    info!("Checkpoint saved to {:?}", file);
    Ok(file)
}

/// Restore a checkpoint
pub fn load_checkpoint<B: Backend>(path: &Path, device: &B::Device) -> Result<LoadedCheckpoint<B>> {
    load_checkpoint_expecting(path, None, device)
}

/// Restore a checkpoint, optionally requiring a specific number of classes
///
/// The head width stored in the weights must equal the number of stored class
/// names (and `expected_classes` when given), otherwise
/// [`ClassifierError::ClassCountMismatch`] is returned.
pub fn load_checkpoint_expecting<B: Backend>(
    path: &Path,
    expected_classes: Option<usize>,
    device: &B::Device,
) -> Result<LoadedCheckpoint<B>> {
    let file = checkpoint_file(path);
    if !file.is_file() {
        return Err(ClassifierError::ModelNotFound(file));
    }

    let record: CheckpointRecord<B> = Recorder::<B>::load(&recorder(), file.clone(), device)
        .map_err(|e| {
            ClassifierError::Checkpoint(format!("Failed to read {}: {:?}", file.display(), e))
        })?;

    let class_names = record.class_names;
    if class_names.is_empty() {
        return Err(ClassifierError::Checkpoint(format!(
            "Checkpoint {} has no class names",
            file.display()
        )));
    }

    let found = record.model_state.fc.weight.val().dims()[1];
    let expected = expected_classes.unwrap_or(class_names.len());
    if found != class_names.len() || found != expected {
        return Err(ClassifierError::ClassCountMismatch { expected, found });
    }

    let model = ClassifierConfig::new(class_names.len())
        .init::<B>(device)?
        .load_record(record.model_state);

    info!(
        "Loaded checkpoint {:?} ({} classes)",
        file,
        class_names.len()
    );

    Ok(LoadedCheckpoint { model, class_names })
}
