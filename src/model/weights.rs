//! Pretrained ResNet-18 weights
//!
//! The backbone starts from the torchvision ImageNet checkpoint. The `.pth`
//! file is read with burn-import's PyTorch recorder; a few torchvision keys
//! are renamed to match the Burn module tree. With the `pretrained` feature
//! the file is downloaded on first use.

use std::path::{Path, PathBuf};

use burn::{
    record::{FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::info;

use super::resnet::ResNet18Record;
use crate::utils::error::{ClassifierError, Result};

/// A downloadable set of weights
#[derive(Debug, Clone, Copy)]
pub struct PretrainedWeights {
    pub name: &'static str,
    pub url: &'static str,
    pub file_name: &'static str,
}

/// torchvision `ResNet18_Weights.IMAGENET1K_V1`
pub const RESNET18_IMAGENET1K_V1: PretrainedWeights = PretrainedWeights {
    name: "ResNet-18 ImageNet1K_V1",
    url: "https://download.pytorch.org/models/resnet18-f37072fd.pth",
    file_name: "resnet18-f37072fd.pth",
};

/// Where training looks for (and downloads) the backbone weights by default
pub const DEFAULT_PRETRAINED: &str = "models/resnet18-f37072fd.pth";

/// torchvision key patterns and their names in [`super::ResNet18`]
///
/// BatchNorm `weight`/`bias` are mapped to `gamma`/`beta` by the recorder itself.
pub const TORCHVISION_KEY_REMAP: [(&str, &str); 2] = [
    (r"downsample\.0\.(.+)", "downsample.conv.$1"),
    (r"downsample\.1\.(.+)", "downsample.bn.$1"),
];

/// Whether `path` holds PyTorch tensors rather than a Burn record
pub fn is_torch_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("pth") | Some("pt")
    )
}

/// Make sure the weights file exists, downloading known weights if possible
pub fn resolve_pretrained(path: &Path) -> Result<PathBuf> {
    let file = if is_torch_file(path) {
        path.to_path_buf()
    } else {
        path.with_extension("mpk")
    };

    if file.is_file() {
        return Ok(file);
    }

    let known = file
        .file_name()
        .map(|name| name == RESNET18_IMAGENET1K_V1.file_name)
        .unwrap_or(false);

    if known {
        return RESNET18_IMAGENET1K_V1.download_to(&file);
    }

    Err(ClassifierError::ModelNotFound(file))
}

/// Read a torchvision ResNet-18 state dict into a backbone record
///
/// The `fc.*` tensors of the ImageNet head are present in the file but have no
/// counterpart in the backbone and are left out.
pub fn load_torchvision_record<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<ResNet18Record<B>> {
    let args = TORCHVISION_KEY_REMAP
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (from, to)| {
            args.with_key_remap(from, to)
        });

    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
    let record: ResNet18Record<B> = Recorder::<B>::load(&recorder, args, device).map_err(|e| {
        ClassifierError::Checkpoint(format!(
            "Failed to read PyTorch weights {}: {:?}",
            path.display(),
            e
        ))
    })?;

    info!("Loaded torchvision weights from {:?}", path);
    Ok(record)
}

impl PretrainedWeights {
    /// Download the weights to `target`, creating its directory
    #[cfg(feature = "pretrained")]
    pub fn download_to(&self, target: &Path) -> Result<PathBuf> {
        use crate::utils::error::ResultExt;
        use burn::data::network::downloader;

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Downloading {} from {}", self.name, self.url);
        let bytes = downloader::download_file_as_bytes(self.url, self.file_name);

        let partial = target.with_extension("part");
        std::fs::write(&partial, &bytes)
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        std::fs::rename(&partial, target)
            .with_context(|| format!("Failed to move weights to {}", target.display()))?;

        info!("Saved {} ({} bytes) to {:?}", self.name, bytes.len(), target);
        Ok(target.to_path_buf())
    }

    #[cfg(not(feature = "pretrained"))]
    pub fn download_to(&self, target: &Path) -> Result<PathBuf> {
        Err(ClassifierError::ModelNotFound(target.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use tempfile::TempDir;

    fn remap(key: &str) -> String {
        TORCHVISION_KEY_REMAP
            .iter()
            .fold(key.to_string(), |key, (from, to)| {
                Regex::new(from).unwrap().replace(&key, *to).to_string()
            })
    }

    #[test]
    fn test_downsample_keys_follow_module_names() {
        assert_eq!(
            remap("layer2.0.downsample.0.weight"),
            "layer2.0.downsample.conv.weight"
        );
        assert_eq!(
            remap("layer4.0.downsample.1.running_var"),
            "layer4.0.downsample.bn.running_var"
        );
    }

    #[test]
    fn test_other_keys_are_unchanged() {
        for key in [
            "conv1.weight",
            "bn1.running_mean",
            "layer1.1.conv2.weight",
            "layer3.0.bn1.bias",
        ] {
            assert_eq!(remap(key), key);
        }
    }

    #[test]
    fn test_torch_file_detection() {
        assert!(is_torch_file(Path::new("models/resnet18-f37072fd.pth")));
        assert!(is_torch_file(Path::new("weights.pt")));
        assert!(!is_torch_file(Path::new("models/backbone.mpk")));
        assert!(!is_torch_file(Path::new("models/backbone")));
    }

    #[test]
    fn test_default_points_at_torchvision_weights() {
        assert!(DEFAULT_PRETRAINED.ends_with(RESNET18_IMAGENET1K_V1.file_name));
        assert!(RESNET18_IMAGENET1K_V1.url.ends_with(RESNET18_IMAGENET1K_V1.file_name));
    }

    #[test]
    fn test_unknown_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = resolve_pretrained(&dir.path().join("custom_backbone.pth"));
        assert!(matches!(result, Err(ClassifierError::ModelNotFound(_))));

        let result = resolve_pretrained(&dir.path().join("backbone"));
        match result {
            Err(ClassifierError::ModelNotFound(path)) => {
                assert_eq!(path.extension().unwrap(), "mpk")
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_existing_file_is_used_as_is() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RESNET18_IMAGENET1K_V1.file_name);
        std::fs::write(&path, b"weights").unwrap();

        assert_eq!(resolve_pretrained(&path).unwrap(), path);
    }

    #[test]
    fn test_corrupted_torch_file_is_a_checkpoint_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pth");
        std::fs::write(&path, b"not a pickle").unwrap();

        let device = Default::default();
        let result = load_torchvision_record::<burn_ndarray::NdArray>(&path, &device);
        assert!(matches!(result, Err(ClassifierError::Checkpoint(_))));
    }
}
