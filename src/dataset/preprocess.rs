//! Image preprocessing shared by training, evaluation and inference.
//!
//! Every image goes through the same steps: RGB conversion, exact resize to a
//! square, scaling to [0, 1] and per-channel ImageNet standardization, laid out
//! as CHW. Nothing here is random, so identical inputs give identical tensors.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader};

use crate::utils::error::{ClassifierError, Result};
use crate::IMAGE_SIZE;

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const CORRUPTED_IMAGE: &str = "Invalid or corrupted image file.";

/// Deterministic image-to-tensor transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessor {
    /// Side length of the square model input
    pub image_size: usize,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            image_size: IMAGE_SIZE,
        }
    }
}

impl Preprocessor {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    /// Number of floats produced per image
    pub fn output_len(&self) -> usize {
        3 * self.image_size * self.image_size
    }

    /// Open and decode an image file
    pub fn load(&self, path: &Path) -> Result<DynamicImage> {
        if !path.is_file() {
            return Err(ClassifierError::InvalidImage(format!(
                "File not found: {}",
                path.display()
            )));
        }

        ImageReader::open(path)
            .and_then(|reader| reader.with_guessed_format())
            .map_err(|_| ClassifierError::InvalidImage(CORRUPTED_IMAGE.to_string()))?
            .decode()
            .map_err(|_| ClassifierError::InvalidImage(CORRUPTED_IMAGE.to_string()))
    }

    /// Decode an image held in memory (e.g. an upload)
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(ClassifierError::InvalidImage("Empty image upload.".to_string()));
        }
        image::load_from_memory(bytes)
            .map_err(|_| ClassifierError::InvalidImage(CORRUPTED_IMAGE.to_string()))
    }

    /// Convert a decoded image to a normalized CHW vector of length [`Self::output_len`]
    pub fn preprocess(&self, image: &DynamicImage) -> Vec<f32> {
        let size = self.image_size as u32;
        let rgb = imageops::resize(&image.to_rgb8(), size, size, FilterType::Triangle);

        let num_pixels = self.image_size * self.image_size;
        let mut normalized = vec![0.0f32; 3 * num_pixels];

        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                normalized[c * num_pixels + i] =
                    (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        normalized
    }

    pub fn preprocess_file(&self, path: &Path) -> Result<Vec<f32>> {
        let image = self.load(path)?;
        Ok(self.preprocess(&image))
    }

    pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let image = self.decode(bytes)?;
        Ok(self.preprocess(&image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_default_size_is_224() {
        let preprocessor = Preprocessor::default();
        let tensor = preprocessor.preprocess(&gradient_image(300, 180));
        assert_eq!(tensor.len(), 3 * 224 * 224);
        assert_eq!(tensor.len(), preprocessor.output_len());
    }

    #[test]
    fn test_preprocessing_is_deterministic() {
        let preprocessor = Preprocessor::new(32);
        let image = gradient_image(64, 48);

        let first = preprocessor.preprocess(&image);
        let second = preprocessor.preprocess(&image);
        assert_eq!(first, second);

        let from_bytes = preprocessor.preprocess_bytes(&png_bytes(&image)).unwrap();
        assert_eq!(first, from_bytes);
    }

    #[test]
    fn test_imagenet_normalization_values() {
        let preprocessor = Preprocessor::new(4);
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 255, 255])));
        let tensor = preprocessor.preprocess(&white);

        let pixels = 4 * 4;
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            for value in &tensor[c * pixels..(c + 1) * pixels] {
                assert!((value - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_rgba_input_is_converted_to_three_channels() {
        let preprocessor = Preprocessor::new(8);
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(10, 10));
        assert_eq!(preprocessor.preprocess(&rgba).len(), 3 * 8 * 8);
    }

    #[test]
    fn test_channels_are_converted_before_resizing() {
        let preprocessor = Preprocessor::new(8);
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_fn(20, 14, |x, y| {
            image::Rgba([(x * 12) as u8, (y * 17) as u8, 90, (x * y % 256) as u8])
        }));
        let rgb = DynamicImage::ImageRgb8(rgba.to_rgb8());

        assert_eq!(preprocessor.preprocess(&rgba), preprocessor.preprocess(&rgb));
    }

    #[test]
    fn test_decode_rejects_non_image_bytes() {
        let preprocessor = Preprocessor::default();
        let err = preprocessor.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidImage(_)));
        assert_eq!(err.to_string(), "Invalid or corrupted image file.");

        assert!(matches!(
            preprocessor.decode(&[]),
            Err(ClassifierError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_load_missing_and_corrupted_files() {
        let dir = TempDir::new().unwrap();
        let preprocessor = Preprocessor::default();

        let missing = dir.path().join("missing.jpg");
        let err = preprocessor.load(&missing).unwrap_err();
        assert!(err.to_string().starts_with("File not found"));

        let corrupted = dir.path().join("broken.jpg");
        std::fs::write(&corrupted, b"not a jpeg").unwrap();
        let err = preprocessor.load(&corrupted).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidImage(_)));
    }

    #[test]
    fn test_load_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("car.png");
        gradient_image(20, 20).save(&path).unwrap();

        let tensor = Preprocessor::new(16).preprocess_file(&path).unwrap();
        assert_eq!(tensor.len(), 3 * 16 * 16);
    }
}
