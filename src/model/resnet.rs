//! ResNet-18 backbone
//!
//! Classic architecture with residual connections:
//! - Input: 3 x H x W (224 x 224 by default, any size >= 32 works)
//! - Conv1: 7x7, stride 2, then 3x3 max pool with stride 2
//! - 4 residual stages with 2 basic blocks each (64, 128, 256, 512 channels)
//! - Global average pooling to a 512-d feature vector
//!
//! The classification layer is not part of the backbone.

use std::path::Path;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{backend::Backend, Tensor},
};
use tracing::info;

use super::weights::{is_torch_file, load_torchvision_record, resolve_pretrained};
use crate::utils::error::{ClassifierError, Result};

/// Width of the feature vector produced by the backbone
pub const FEATURE_DIM: usize = 512;

/// 1x1 projection used when a block changes resolution or width
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3x3 convolutions with an identity (or projected) shortcut
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);

        let downsample = if stride != 1 || in_channels != out_channels {
            Some(Downsample::new(in_channels, out_channels, stride, device))
        } else {
            None
        };

        Self {
            conv1,
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2,
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.activation.forward(x.add(identity))
    }
}

/// ResNet-18 feature extractor
#[derive(Module, Debug)]
pub struct ResNet18<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    maxpool: MaxPool2d,
    layer1: Vec<BasicBlock<B>>,
    layer2: Vec<BasicBlock<B>>,
    layer3: Vec<BasicBlock<B>>,
    layer4: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    activation: Relu,
}

impl<B: Backend> ResNet18<B> {
    /// Create a randomly initialized backbone
    pub fn new(device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            conv1,
            bn1: BatchNormConfig::new(64).init(device),
            maxpool,
            layer1: Self::stage(64, 64, 1, device),
            layer2: Self::stage(64, 128, 2, device),
            layer3: Self::stage(128, 256, 2, device),
            layer4: Self::stage(256, 512, 2, device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            activation: Relu::new(),
        }
    }

    fn stage(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        device: &B::Device,
    ) -> Vec<BasicBlock<B>> {
        vec![
            BasicBlock::new(in_channels, out_channels, stride, device),
            BasicBlock::new(out_channels, out_channels, 1, device),
        ]
    }

    /// Load backbone weights from a torchvision `.pth` file or a Burn record
    ///
    /// A missing torchvision ResNet-18 file is downloaded when the `pretrained`
    /// feature is enabled; any other missing file is [`ClassifierError::ModelNotFound`].
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> Result<Self> {
        let file = resolve_pretrained(path)?;

        let record = if is_torch_file(&file) {
            load_torchvision_record::<B>(&file, device)?
        } else {
            let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
            let record: ResNet18Record<B> = Recorder::<B>::load(&recorder, file.clone(), device)
                .map_err(|e| {
                    ClassifierError::Checkpoint(format!(
                        "Failed to load pretrained backbone {}: {:?}",
                        file.display(),
                        e
                    ))
                })?;
            info!("Loaded pretrained backbone from {:?}", file);
            record
        };

        Ok(self.load_record(record))
    }

    /// Forward pass returning `[batch, 512]` features
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(input);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }

        let x = self.avgpool.forward(x);

        // [batch, channels, 1, 1] -> [batch, channels]
        let [batch, channels, _, _] = x.dims();
        x.reshape([batch, channels])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_resnet_feature_shape() {
        let device = Default::default();
        let backbone = ResNet18::<TestBackend>::new(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let features = backbone.forward(input);

        assert_eq!(features.dims(), [2, FEATURE_DIM]);
    }

    #[test]
    fn test_basic_block_downsamples() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(64, 128, 2, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 64, 8, 8], &device);
        assert_eq!(block.forward(input).dims(), [1, 128, 4, 4]);
    }

    #[test]
    fn test_resnet18_parameter_count() {
        let device = Default::default();
        let backbone = ResNet18::<TestBackend>::new(&device);

        // torchvision resnet18 without its fc layer
        assert_eq!(backbone.num_params(), 11_176_512);
    }

    #[test]
    fn test_load_pretrained_missing_file() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let backbone = ResNet18::<TestBackend>::new(&device);

        let result = backbone.load_pretrained(&dir.path().join("resnet18"), &device);
        assert!(matches!(result, Err(ClassifierError::ModelNotFound(_))));
    }

    #[test]
    fn test_load_pretrained_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resnet18");
        let device = Default::default();

        let source = ResNet18::<TestBackend>::new(&device);
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        Recorder::<TestBackend>::record(&recorder, source.clone().into_record(), path.clone())
            .unwrap();

        let loaded = ResNet18::<TestBackend>::new(&device)
            .load_pretrained(&path, &device)
            .unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let expected: Vec<f32> = source.forward(input.clone()).into_data().to_vec().unwrap();
        let actual: Vec<f32> = loaded.forward(input).into_data().to_vec().unwrap();
        for (e, a) in expected.iter().zip(actual.iter()) {
            assert!((e - a).abs() < 1e-5);
        }
    }
}
