//! Two-phase supervised fine-tuning
//!
//! Phase 1 trains only the new head on top of a frozen backbone. Phase 2
//! unfreezes everything and continues with a fresh Adam optimizer. After
//! every epoch the model is validated and a checkpoint is written whenever
//! validation accuracy strictly improves on the best seen in either phase.

use std::path::PathBuf;

use burn::{
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{AdamConfig, Optimizer},
    tensor::backend::AutodiffBackend,
};
use chrono::Utc;
use colored::Colorize;
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::dataset::{ImageDataset, ImageFolderDataset, Preprocessor, SplitConfig, TrainValSplit};
use crate::model::{save_checkpoint, CarBrandClassifier, ClassifierConfig};
use crate::training::trainer::{EpochMetrics, Phase, Trainer, TrainingState, TrainingSummary};
use crate::utils::error::{ClassifierError, Result};
use crate::utils::logging::TrainingLogger;

/// Everything an epoch needs besides the model and optimizer
struct PhaseContext<'a> {
    train: &'a ImageDataset,
    validation: &'a ImageDataset,
    class_names: &'a [String],
    checkpoint_path: &'a std::path::Path,
}

/// Run the complete two-phase training protocol
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
///
/// # Errors
/// A missing or empty dataset, fewer than two classes, or an empty training
/// or validation split is reported before any training happens.
pub fn run_training<B>(config: &TrainingConfig, device: &B::Device) -> Result<TrainingSummary>
where
    B: AutodiffBackend,
{
    config.validate()?;
    let started_at = Utc::now();

    println!("{}", "Loading Dataset...".cyan());
    let dataset = ImageFolderDataset::new(&config.data_dir)?;

    if dataset.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "No images found in {} (expected {}/<class_name>/*.jpg)",
            config.data_dir.display(),
            config.data_dir.display()
        )));
    }
    if dataset.num_classes() < 2 {
        return Err(ClassifierError::Dataset(format!(
            "Need at least 2 classes to train, found {}",
            dataset.num_classes()
        )));
    }

    let split_config = SplitConfig::new(config.val_split, config.seed)?;
    let split = TrainValSplit::from_samples(dataset.labeled_paths(), &split_config)?;

    println!(
        "Total samples: {}, Train: {}, Val: {}",
        split.total(),
        split.train.len(),
        split.validation.len()
    );
    println!("Classes: {:?}", dataset.class_names);

    if split.train.is_empty() {
        return Err(ClassifierError::Dataset(
            "Training split is empty".to_string(),
        ));
    }
    if split.validation.is_empty() {
        return Err(ClassifierError::Dataset(format!(
            "Validation split is empty: {} images with val_split {} leaves nothing to validate on",
            split.total(),
            config.val_split
        )));
    }

    let class_names = dataset.class_names.clone();
    let preprocessor = Preprocessor::new(config.image_size);

    let (train_dataset, val_dataset) = if config.cache_images {
        println!("{}", "Pre-loading Training Data...".cyan().bold());
        let train = ImageDataset::new_cached(split.train.clone(), preprocessor);
        println!("{}", "Pre-loading Validation Data...".cyan().bold());
        let val = ImageDataset::new_cached(split.validation.clone(), preprocessor);
        (train, val)
    } else {
        (
            ImageDataset::new(split.train.clone(), preprocessor),
            ImageDataset::new(split.validation.clone(), preprocessor),
        )
    };

    let model_config = ClassifierConfig::new(class_names.len()).with_pretrained_path(
        config
            .pretrained_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
    );
    let model = model_config.init::<B>(device)?;

    info!(
        "Model created: {} parameters ({} in the head)",
        burn::module::Module::num_params(&model),
        model.head_params()
    );

    let warmup_epochs = config.effective_warmup_epochs();
    if warmup_epochs > 0 && config.pretrained_path.is_none() {
        warn!("Warm-up trains the head on a randomly initialised backbone");
    }

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  🏷️  Training samples:   {}", train_dataset.len());
    println!("  ✅ Validation samples: {}", val_dataset.len());
    println!("  🧊 Warm-up epochs:     {}", warmup_epochs);
    println!("  🔄 Fine-tune epochs:   {}", config.epochs);
    println!("  📦 Batch size:         {}", config.batch_size);
    println!("  📈 Learning rate:      {}", config.learning_rate);
    println!("  🧠 Device:             {:?}", device);

    let mut trainer = Trainer::<B>::new(
        model,
        config.learning_rate,
        config.batch_size,
        config.image_size,
        config.seed,
        device.clone(),
    );
    let mut state = TrainingState::new();
    let mut saved_checkpoint: Option<PathBuf> = None;

    let context = PhaseContext {
        train: &train_dataset,
        validation: &val_dataset,
        class_names: &class_names,
        checkpoint_path: &config.checkpoint_path,
    };

    if warmup_epochs > 0 {
        println!();
        println!("{}", "Phase 1: Training classifier only...".green().bold());
        let mut optimizer = AdamConfig::new().init::<B, CarBrandClassifier<B>>();
        run_phase(
            &mut trainer,
            &mut optimizer,
            Phase::Warmup,
            warmup_epochs,
            &context,
            &mut state,
            &mut saved_checkpoint,
        )?;
    }

    println!();
    println!("{}", "Phase 2: Training full model...".green().bold());
    let mut optimizer = AdamConfig::new().init::<B, CarBrandClassifier<B>>();
    run_phase(
        &mut trainer,
        &mut optimizer,
        Phase::FineTune,
        config.epochs,
        &context,
        &mut state,
        &mut saved_checkpoint,
    )?;

    let summary = TrainingSummary {
        best_val_accuracy: state.best_val_accuracy,
        checkpoint_path: saved_checkpoint,
        history: state.history,
        train_samples: train_dataset.len(),
        val_samples: val_dataset.len(),
        class_names,
        started_at,
        finished_at: Utc::now(),
    };

    let history_path = config.history_path();
    summary.save_json(&history_path)?;
    info!("Training history written to {:?}", history_path);

    println!();
    println!(
        "{} Best Val Acc: {:.4}",
        "Training finished!".green().bold(),
        summary.best_val_accuracy
    );
    match &summary.checkpoint_path {
        Some(path) => println!("Model saved at {}", path.display()),
        None => {
            warn!("Validation accuracy never rose above 0; no checkpoint was written");
            println!("{}", "No checkpoint written (no epoch improved)".yellow());
        }
    }

    Ok(summary)
}

fn run_phase<B, O>(
    trainer: &mut Trainer<B>,
    optimizer: &mut O,
    phase: Phase,
    epochs: usize,
    context: &PhaseContext<'_>,
    state: &mut TrainingState,
    saved_checkpoint: &mut Option<PathBuf>,
) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<CarBrandClassifier<B>, B>,
{
    let mut logger = TrainingLogger::new(&phase.to_string(), epochs);

    for epoch in 0..epochs {
        logger.start_epoch(epoch);

        let (train_loss, train_accuracy) =
            trainer.train_epoch(optimizer, context.train, phase.mode());
        let val_accuracy = trainer.validate(context.validation);

        println!(
            "{} {}/{} - Train Loss: {:.4} - Val Acc: {:.4}",
            phase.label(),
            epoch + 1,
            epochs,
            train_loss,
            val_accuracy
        );
        logger.end_epoch(train_loss, val_accuracy);

        let metrics = EpochMetrics::new(phase, epoch + 1, train_loss, train_accuracy, val_accuracy);
        if state.record_epoch(metrics) {
            let path = save_checkpoint(
                &trainer.model.valid(),
                context.class_names,
                context.checkpoint_path,
            )?;
            println!(
                "{} {:.4}",
                "Saved best model with Val Acc:".green(),
                state.best_val_accuracy
            );
            *saved_checkpoint = Some(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::load_checkpoint;
    use crate::test_utils::{biased_classifier, class_names, write_image};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn write_class(root: &Path, class: &str, color: [u8; 3], count: usize) {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            RgbImage::from_pixel(40, 40, Rgb(color))
                .save(dir.join(format!("{}_{}.png", class, i)))
                .unwrap();
        }
    }

    fn tiny_config(root: &Path) -> TrainingConfig {
        TrainingConfig {
            data_dir: root.join("data"),
            checkpoint_path: root.join("models").join("car_brand_model.mpk"),
            epochs: 1,
            warmup_epochs: 1,
            batch_size: 2,
            val_split: 0.5,
            image_size: 32,
            pretrained_path: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_two_phase_training_end_to_end() {
        let dir = TempDir::new().unwrap();
        write_class(&dir.path().join("data"), "audi", [220, 30, 30], 2);
        write_class(&dir.path().join("data"), "bmw", [30, 30, 220], 2);
        let config = tiny_config(dir.path());
        let device = Default::default();

        let summary = run_training::<TestBackend>(&config, &device).unwrap();

        assert_eq!(summary.train_samples, 2);
        assert_eq!(summary.val_samples, 2);
        assert_eq!(summary.history.len(), 2);
        assert_eq!(summary.history[0].phase, Phase::Warmup);
        assert_eq!(summary.history[1].phase, Phase::FineTune);
        assert!(config.history_path().is_file());

        // a checkpoint exists exactly when some epoch improved
        let any_improved = summary.history.iter().any(|m| m.improved);
        assert_eq!(summary.checkpoint_path.is_some(), any_improved);
        if let Some(path) = summary.checkpoint_path {
            let loaded = load_checkpoint::<NdArray>(&path, &device).unwrap();
            assert_eq!(loaded.class_names, vec!["audi", "bmw"]);
        }
    }

    #[test]
    fn test_warmup_skipped_without_freezing() {
        let dir = TempDir::new().unwrap();
        write_class(&dir.path().join("data"), "audi", [220, 30, 30], 2);
        write_class(&dir.path().join("data"), "bmw", [30, 30, 220], 2);
        let config = TrainingConfig {
            freeze_base: false,
            cache_images: false,
            ..tiny_config(dir.path())
        };

        let summary = run_training::<TestBackend>(&config, &Default::default()).unwrap();
        assert_eq!(summary.history.len(), 1);
        assert_eq!(summary.history[0].phase, Phase::FineTune);
    }

    #[test]
    fn test_single_class_dataset_rejected() {
        let dir = TempDir::new().unwrap();
        write_class(&dir.path().join("data"), "audi", [220, 30, 30], 4);

        let result = run_training::<TestBackend>(&tiny_config(dir.path()), &Default::default());
        assert!(matches!(result, Err(ClassifierError::Dataset(_))));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("data").join("audi")).unwrap();
        std::fs::create_dir_all(dir.path().join("data").join("bmw")).unwrap();

        let result = run_training::<TestBackend>(&tiny_config(dir.path()), &Default::default());
        assert!(matches!(result, Err(ClassifierError::Dataset(_))));
    }

    #[test]
    fn test_empty_validation_split_rejected() {
        let dir = TempDir::new().unwrap();
        write_class(&dir.path().join("data"), "audi", [220, 30, 30], 1);
        write_class(&dir.path().join("data"), "bmw", [30, 30, 220], 1);
        let config = TrainingConfig {
            val_split: 0.15,
            ..tiny_config(dir.path())
        };

        let result = run_training::<TestBackend>(&config, &Default::default());
        assert!(matches!(result, Err(ClassifierError::Dataset(_))));
        assert!(!config.checkpoint_path.exists());
    }

    #[test]
    fn test_missing_pretrained_weights_stop_training() {
        let dir = TempDir::new().unwrap();
        write_class(&dir.path().join("data"), "audi", [220, 30, 30], 2);
        write_class(&dir.path().join("data"), "bmw", [30, 30, 220], 2);
        let config = TrainingConfig {
            pretrained_path: Some(dir.path().join("custom_backbone.pth")),
            ..tiny_config(dir.path())
        };

        let result = run_training::<TestBackend>(&config, &Default::default());
        assert!(matches!(result, Err(ClassifierError::ModelNotFound(_))));
        assert!(!config.checkpoint_path.exists());
    }

    #[test]
    fn test_epochs_without_improvement_write_nothing() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let preprocessor = Preprocessor::new(32);

        let audi = write_image(&dir.path().join("audi"), "a.png", [220, 30, 30]);
        let bmw = write_image(&dir.path().join("bmw"), "b.png", [30, 30, 220]);
        let samples = vec![(audi, 0), (bmw, 1)];
        let train = ImageDataset::new(samples.clone(), preprocessor);
        let validation = ImageDataset::new(samples, preprocessor);

        let names = class_names(&["audi", "bmw"]);
        let checkpoint_path = dir.path().join("models").join("car_brand_model.mpk");
        let context = PhaseContext {
            train: &train,
            validation: &validation,
            class_names: &names,
            checkpoint_path: &checkpoint_path,
        };

        // a zero learning rate keeps the always-"audi" model, so accuracy stays at 0.5
        let model = biased_classifier::<TestBackend>(2, 0, &device);
        let mut trainer = Trainer::new(model, 0.0, 2, 32, 42, device);
        let mut state = TrainingState::new();
        let mut saved = None;

        let mut optimizer =
            AdamConfig::new().init::<TestBackend, CarBrandClassifier<TestBackend>>();
        run_phase(
            &mut trainer,
            &mut optimizer,
            Phase::FineTune,
            1,
            &context,
            &mut state,
            &mut saved,
        )
        .unwrap();

        let written = saved.clone().unwrap();
        assert!(written.is_file());
        assert_eq!(state.best_val_accuracy, 0.5);

        std::fs::remove_file(&written).unwrap();
        run_phase(
            &mut trainer,
            &mut optimizer,
            Phase::FineTune,
            2,
            &context,
            &mut state,
            &mut saved,
        )
        .unwrap();

        let improved: Vec<bool> = state.history.iter().map(|m| m.improved).collect();
        assert_eq!(improved, vec![true, false, false]);
        assert!(!written.exists());
        assert_eq!(saved, Some(written));
    }
}
