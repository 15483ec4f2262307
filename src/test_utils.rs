//! Shared fixtures for unit tests

use std::path::{Path, PathBuf};

use burn::module::Param;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{Rgb, RgbImage};

use crate::model::{CarBrandClassifier, ClassifierConfig, FEATURE_DIM};

/// A classifier whose logits ignore the image and strongly favour `favored`
pub fn biased_classifier<B: Backend>(
    num_classes: usize,
    favored: usize,
    device: &B::Device,
) -> CarBrandClassifier<B> {
    let mut model = ClassifierConfig::new(num_classes).init::<B>(device).unwrap();

    let bias: Vec<f32> = (0..num_classes)
        .map(|i| if i == favored { 50.0 } else { -50.0 })
        .collect();

    model.fc.weight = Param::from_tensor(Tensor::zeros([FEATURE_DIM, num_classes], device));
    model.fc.bias = Some(Param::from_tensor(Tensor::from_data(
        TensorData::new(bias, [num_classes]),
        device,
    )));
    model
}

pub fn class_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Write a solid-colour PNG
pub fn write_image(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    RgbImage::from_pixel(40, 40, Rgb(color)).save(&path).unwrap();
    path
}
