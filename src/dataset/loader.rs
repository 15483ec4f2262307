//! Image folder dataset loader
//!
//! Reads a dataset laid out as one sub-directory per class. Class names are the
//! sorted sub-directory names and a sample's label is the index of its class in
//! that sorted list, so the label mapping is stable across runs and machines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{ClassifierError, Result};
use crate::utils::format_number;

/// File extensions recognised as images
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// A single image sample with its label and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class name (the sub-directory name, e.g. "toyota")
    pub class_name: String,
}

/// Labeled image folder
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples, grouped by class in label order
    pub samples: Vec<ImageSample>,
    /// Sorted class names; position is the label
    pub class_names: Vec<String>,
    /// Mapping from class name to label index
    pub class_to_idx: HashMap<String, usize>,
}

/// Whether a path has a recognised image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

impl ImageFolderDataset {
    /// Scan a dataset directory
    ///
    /// The directory should be structured as:
    /// ```text
    /// root_dir/
    /// ├── audi/
    /// │   ├── image1.jpg
    /// │   └── image2.jpg
    /// ├── bmw/
    /// │   └── ...
    /// └── ...
    /// ```
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading dataset from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(ClassifierError::Dataset(format!(
                "Dataset directory does not exist: {}",
                root_dir.display()
            )));
        }

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_names.push(name.to_string());
                }
            }
        }
        class_names.sort();

        info!("Found {} classes", class_names.len());

        let class_to_idx: HashMap<String, usize> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        let mut samples = Vec::new();

        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root_dir.join(class_name);

            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            paths.sort();

            debug!(
                "Class '{}' (label {}): {} images",
                class_name,
                label,
                paths.len()
            );

            samples.extend(paths.into_iter().map(|path| ImageSample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root_dir,
            samples,
            class_names,
            class_to_idx,
        })
    }

    /// Get the number of samples in the dataset
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the number of classes
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// `(path, label)` pairs for the burn dataset
    pub fn labeled_paths(&self) -> Vec<(PathBuf, usize)> {
        self.samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect()
    }

    /// Re-label the samples against another class list (e.g. a checkpoint's)
    ///
    /// Every class of this dataset must exist in `class_names`.
    pub fn relabel(&self, class_names: &[String]) -> Result<Vec<(PathBuf, usize)>> {
        let mut mapping = Vec::with_capacity(self.class_names.len());
        for name in &self.class_names {
            let idx = class_names.iter().position(|c| c == name).ok_or_else(|| {
                ClassifierError::Dataset(format!(
                    "Class '{}' is not known to the model (known classes: {})",
                    name,
                    class_names.join(", ")
                ))
            })?;
            mapping.push(idx);
        }

        Ok(self
            .samples
            .iter()
            .map(|s| (s.path.clone(), mapping[s.label]))
            .collect())
    }

    /// Get statistics about the dataset
    pub fn get_stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            num_classes: self.num_classes(),
            class_counts,
            class_names: self.class_names.clone(),
        }
    }
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", format_number(self.total_samples));
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        for (idx, (name, count)) in self
            .class_names
            .iter()
            .zip(self.class_counts.iter())
            .enumerate()
        {
            let bar_len = if self.total_samples > 0 {
                (*count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            let bar: String = "█".repeat(bar_len);
            println!("    {:3}. {:30} {:5} {}", idx, name, count, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, class: &str, file: &str) {
        let class_dir = dir.join(class);
        std::fs::create_dir_all(&class_dir).unwrap();
        std::fs::write(class_dir.join(file), b"").unwrap();
    }

    #[test]
    fn test_classes_are_sorted_directory_names() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "toyota", "a.jpg");
        touch(dir.path(), "audi", "b.png");
        touch(dir.path(), "bmw", "c.JPEG");
        std::fs::write(dir.path().join("README.txt"), b"not a class").unwrap();

        let dataset = ImageFolderDataset::new(dir.path()).unwrap();

        assert_eq!(dataset.class_names, vec!["audi", "bmw", "toyota"]);
        assert_eq!(dataset.class_to_idx["toyota"], 2);
        assert_eq!(dataset.len(), 3);

        let toyota = dataset
            .samples
            .iter()
            .find(|s| s.class_name == "toyota")
            .unwrap();
        assert_eq!(toyota.label, 2);
    }

    #[test]
    fn test_non_image_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "audi", "a.jpg");
        touch(dir.path(), "audi", "notes.txt");
        touch(dir.path(), "audi", "no_extension");

        let dataset = ImageFolderDataset::new(dir.path()).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.get_stats().class_counts, vec![1]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = ImageFolderDataset::new(dir.path().join("nope"));
        assert!(matches!(result, Err(ClassifierError::Dataset(_))));
    }

    #[test]
    fn test_relabel_against_checkpoint_classes() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "bmw", "a.jpg");
        touch(dir.path(), "toyota", "b.jpg");

        let dataset = ImageFolderDataset::new(dir.path()).unwrap();
        let checkpoint_classes: Vec<String> =
            ["audi", "bmw", "toyota"].iter().map(|s| s.to_string()).collect();

        let labels: Vec<usize> = dataset
            .relabel(&checkpoint_classes)
            .unwrap()
            .into_iter()
            .map(|(_, label)| label)
            .collect();
        assert_eq!(labels, vec![1, 2]);

        let unknown = vec!["audi".to_string()];
        assert!(dataset.relabel(&unknown).is_err());
    }
}
