//! Car brand classifier
//!
//! A ResNet-18 backbone whose final layer is replaced by a fresh linear head
//! with one output per brand. The backbone can be frozen so that only the head
//! learns (the warm-up phase of training).

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{activation::softmax, backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::resnet::{ResNet18, FEATURE_DIM};
use crate::utils::error::ClassifierError;

/// Configuration for the CarBrandClassifier
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Number of brands (one logit per brand)
    pub num_classes: usize,

    /// Optional backbone weights (Burn record file) to start from
    pub pretrained_path: Option<String>,
}

impl ClassifierConfig {
    /// Build a classifier, loading pretrained backbone weights when configured
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::Result<CarBrandClassifier<B>> {
        if self.num_classes == 0 {
            return Err(ClassifierError::Config(
                "num_classes must be at least 1".to_string(),
            ));
        }

        let backbone = ResNet18::new(device);
        let backbone = match &self.pretrained_path {
            Some(path) => backbone.load_pretrained(Path::new(path), device)?,
            None => {
                info!("No pretrained weights configured, backbone starts from random init");
                backbone
            }
        };

        Ok(CarBrandClassifier {
            backbone,
            fc: LinearConfig::new(FEATURE_DIM, self.num_classes).init(device),
        })
    }
}

/// Which parameters receive gradients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainMode {
    /// Backbone is frozen; only the head learns
    Frozen,
    /// Every parameter learns
    Full,
}

impl std::fmt::Display for TrainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainMode::Frozen => write!(f, "frozen"),
            TrainMode::Full => write!(f, "full"),
        }
    }
}

/// ResNet-18 with a brand classification head
#[derive(Module, Debug)]
pub struct CarBrandClassifier<B: Backend> {
    pub backbone: ResNet18<B>,
    /// Replaced final layer: 512 features -> num_classes logits
    pub fc: Linear<B>,
}

impl<B: Backend> CarBrandClassifier<B> {
    /// Forward pass through every layer
    ///
    /// # Arguments
    /// * `images` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward_with_mode(images, TrainMode::Full)
    }

    /// Forward pass where a frozen backbone is cut out of the autodiff graph
    pub fn forward_with_mode(&self, images: Tensor<B, 4>, mode: TrainMode) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        let features = match mode {
            TrainMode::Frozen => features.detach(),
            TrainMode::Full => features,
        };
        self.fc.forward(features)
    }

    /// Forward pass with softmax applied
    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.fc.weight.val().dims()[1]
    }

    /// Number of parameters in the head alone
    pub fn head_params(&self) -> usize {
        self.fc.num_params()
    }
}
