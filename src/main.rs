//! Car Brand Classifier CLI
//!
//! Entry point for training, evaluating and running the car brand classifier.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;
use walkdir::WalkDir;

use car_brand_classifier::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use car_brand_classifier::config::{load_toml_config, EvaluationConfig, TrainingConfig};
use car_brand_classifier::dataset::{is_image_file, ImageFolderDataset, SplitConfig};
use car_brand_classifier::evaluation::evaluate_checkpoint;
use car_brand_classifier::inference::Predictor;
use car_brand_classifier::training::run_training;
use car_brand_classifier::utils::format_duration;
use car_brand_classifier::utils::logging::{init_logging, LogConfig};
use car_brand_classifier::{Preprocessor, DEFAULT_CHECKPOINT, DEFAULT_SEED, IMAGE_SIZE, VAL_SPLIT};

/// Car brand classification with a fine-tuned ResNet-18
#[derive(Parser, Debug)]
#[command(name = "car_brand_classifier")]
#[command(version)]
#[command(about = "Train, evaluate and run a car brand classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fine-tune ResNet-18 on an image folder (warm-up, then full training)
    Train {
        /// TOML file with training settings; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Dataset directory with one sub-directory per brand
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Where the best checkpoint is saved
        #[arg(short, long)]
        checkpoint: Option<PathBuf>,

        /// Full fine-tuning epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Head-only warm-up epochs
        #[arg(long)]
        warmup_epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Learning rate
        #[arg(short, long)]
        learning_rate: Option<f64>,

        /// Validation fraction (0.0-1.0)
        #[arg(long)]
        val_split: Option<f64>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Image size (square)
        #[arg(long)]
        image_size: Option<usize>,

        /// Backbone weights: torchvision `.pth` or Burn record
        /// [default: models/resnet18-f37072fd.pth, downloaded if missing]
        #[arg(long)]
        pretrained: Option<PathBuf>,

        /// Start the backbone from random weights
        #[arg(long, default_value = "false", conflicts_with = "pretrained")]
        no_pretrained: bool,

        /// Skip the frozen-backbone warm-up phase
        #[arg(long, default_value = "false")]
        no_freeze: bool,

        /// Decode images on demand instead of pre-loading them
        #[arg(long, default_value = "false")]
        no_cache: bool,
    },

    /// Evaluate a checkpoint on a labeled test folder
    Evaluate {
        /// TOML file with evaluation settings; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Test directory with one sub-directory per brand
        #[arg(short, long)]
        test_dir: Option<PathBuf>,

        /// Path to trained model
        #[arg(short, long)]
        checkpoint: Option<PathBuf>,

        /// Batch size for evaluation
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Image size (square)
        #[arg(long)]
        image_size: Option<usize>,

        /// Write the confusion matrix as CSV
        #[arg(long)]
        confusion_csv: Option<PathBuf>,

        /// Write the full report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,
    },

    /// Run inference on a single image or directory
    Infer {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Path to trained model
        #[arg(short, long, default_value = DEFAULT_CHECKPOINT)]
        checkpoint: PathBuf,

        /// Number of ranked classes to show
        #[arg(short = 'k', long, default_value = "3")]
        top_k: usize,

        /// Image size (square)
        #[arg(long, default_value_t = IMAGE_SIZE)]
        image_size: usize,
    },

    /// Show dataset statistics and the resulting train/val split
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data")]
        data_dir: PathBuf,

        /// Validation fraction (0.0-1.0)
        #[arg(long, default_value_t = VAL_SPLIT)]
        val_split: f64,

        /// Random seed for reproducibility
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            config,
            data_dir,
            checkpoint,
            epochs,
            warmup_epochs,
            batch_size,
            learning_rate,
            val_split,
            seed,
            image_size,
            pretrained,
            no_pretrained,
            no_freeze,
            no_cache,
        } => {
            let mut cfg: TrainingConfig = match &config {
                Some(path) => load_toml_config(path)?,
                None => TrainingConfig::default(),
            };
            if let Some(v) = data_dir {
                cfg.data_dir = v;
            }
            if let Some(v) = checkpoint {
                cfg.checkpoint_path = v;
            }
            if let Some(v) = epochs {
                cfg.epochs = v;
            }
            if let Some(v) = warmup_epochs {
                cfg.warmup_epochs = v;
            }
            if let Some(v) = batch_size {
                cfg.batch_size = v;
            }
            if let Some(v) = learning_rate {
                cfg.learning_rate = v;
            }
            if let Some(v) = val_split {
                cfg.val_split = v;
            }
            if let Some(v) = seed {
                cfg.seed = v;
            }
            if let Some(v) = image_size {
                cfg.image_size = v;
            }
            if pretrained.is_some() {
                cfg.pretrained_path = pretrained;
            }
            if no_pretrained {
                cfg.pretrained_path = None;
            }
            if no_freeze {
                cfg.freeze_base = false;
            }
            if no_cache {
                cfg.cache_images = false;
            }

            cmd_train(&cfg)?;
        }

        Commands::Evaluate {
            config,
            test_dir,
            checkpoint,
            batch_size,
            image_size,
            confusion_csv,
            report_json,
        } => {
            let mut cfg: EvaluationConfig = match &config {
                Some(path) => load_toml_config(path)?,
                None => EvaluationConfig::default(),
            };
            if let Some(v) = test_dir {
                cfg.test_dir = v;
            }
            if let Some(v) = checkpoint {
                cfg.checkpoint_path = v;
            }
            if let Some(v) = batch_size {
                cfg.batch_size = v;
            }
            if let Some(v) = image_size {
                cfg.image_size = v;
            }
            if confusion_csv.is_some() {
                cfg.confusion_csv = confusion_csv;
            }
            if report_json.is_some() {
                cfg.report_json = report_json;
            }

            cmd_evaluate(&cfg)?;
        }

        Commands::Infer {
            input,
            checkpoint,
            top_k,
            image_size,
        } => {
            cmd_infer(&input, &checkpoint, top_k, image_size)?;
        }

        Commands::Stats {
            data_dir,
            val_split,
            seed,
        } => {
            cmd_stats(&data_dir, val_split, seed)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════╗
 ║   🚗 Car Brand Classifier                         ║
 ║   ResNet-18 transfer learning with Burn + Rust    ║
 ╚══════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    info!("Training with config: {:?}", config);
    println!("{} {}", "Backend:".cyan(), backend_name());

    let device = default_device();
    let summary = run_training::<TrainingBackend>(config, &device)?;

    let elapsed = (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0;
    println!("{} {}", "Training time:".cyan(), format_duration(elapsed));

    println!();
    println!("{}", "Next steps:".cyan().bold());
    if let Some(path) = &summary.checkpoint_path {
        println!(
            "  • Evaluate: car_brand_classifier evaluate --checkpoint {} --test-dir <dir>",
            path.display()
        );
        println!(
            "  • Serve:    car-brand-server --checkpoint {}",
            path.display()
        );
    }

    Ok(())
}

fn cmd_evaluate(config: &EvaluationConfig) -> Result<()> {
    info!("Evaluating {:?} on {:?}", config.checkpoint_path, config.test_dir);
    println!("{} {}", "Backend:".cyan(), backend_name());

    let device = default_device();
    let report = evaluate_checkpoint::<DefaultBackend>(config, &device)?;
    report.print();

    Ok(())
}

fn cmd_infer(input: &Path, checkpoint: &Path, top_k: usize, image_size: usize) -> Result<()> {
    let device = default_device();
    let predictor = Predictor::<DefaultBackend>::load_with_config(
        checkpoint,
        Preprocessor::new(image_size),
        None,
        &device,
    )
    .with_context(|| format!("Failed to load model from {}", checkpoint.display()))?;

    println!(
        "{} {} classes: {}",
        "Model loaded:".green(),
        predictor.num_classes(),
        predictor.class_names().join(", ")
    );
    println!();

    let images: Vec<PathBuf> = if input.is_dir() {
        let mut paths: Vec<PathBuf> = WalkDir::new(input)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_image_file(p))
            .collect();
        paths.sort();
        paths
    } else {
        vec![input.to_path_buf()]
    };

    if images.is_empty() {
        println!("{} No images found in {}", "Warning:".yellow(), input.display());
        return Ok(());
    }

    for path in &images {
        match predictor.predict_file(path) {
            Ok(prediction) => println!("{}", prediction.display(top_k)),
            Err(e) => println!("{} {}: {}", "Error:".red(), path.display(), e),
        }
    }

    Ok(())
}

fn cmd_stats(data_dir: &Path, val_split: f64, seed: u64) -> Result<()> {
    info!("Computing dataset statistics for: {:?}", data_dir);

    let dataset = ImageFolderDataset::new(data_dir)?;
    dataset.get_stats().print();

    let split_config = SplitConfig::new(val_split, seed)?;
    let (train, val) = split_config.split_sizes(dataset.len());

    println!();
    println!("{}", "Train/validation split:".cyan().bold());
    println!("  Validation fraction: {}", val_split);
    println!("  Train: {}, Val: {}", train, val);
    if val == 0 {
        println!(
            "  {} the validation split is empty; add images or raise --val-split",
            "Warning:".yellow()
        );
    }

    Ok(())
}
