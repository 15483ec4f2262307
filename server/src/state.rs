//! Application state for the prediction server
//!
//! The predictor is loaded once in `main` and shared with every handler
//! through an `Arc`. Burn modules are `Send` but not `Sync`, so forward passes
//! are serialized by a mutex.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use car_brand_classifier::backend::{default_device, DefaultBackend};
use car_brand_classifier::inference::{Prediction, Predictor};
use car_brand_classifier::{ClassifierError, Preprocessor, DEFAULT_CHECKPOINT, IMAGE_SIZE};

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Checkpoint loaded at startup
    pub checkpoint_path: PathBuf,
    /// Side length the uploads are resized to
    pub image_size: usize,
    /// Largest accepted request body
    pub max_upload_bytes: usize,
}

/// Default upload limit; phone photos are routinely above axum's 2 MB default
pub const DEFAULT_MAX_UPLOAD_MB: usize = 20;

/// Smallest input the backbone's downsampling stack accepts
pub const MIN_IMAGE_SIZE: usize = 32;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT),
            image_size: IMAGE_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.image_size < MIN_IMAGE_SIZE {
            return Err(ClassifierError::Config(format!(
                "image_size must be at least {}, got {}",
                MIN_IMAGE_SIZE, self.image_size
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(ClassifierError::Config(
                "max upload size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    predictor: Mutex<Predictor<DefaultBackend>>,
    class_names: Vec<String>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, predictor: Predictor<DefaultBackend>) -> Self {
        let class_names = predictor.class_names().to_vec();
        Self {
            config,
            predictor: Mutex::new(predictor),
            class_names,
            started_at: Instant::now(),
        }
    }

    /// Load the configured checkpoint; any failure here must stop the server
    pub fn load(config: ServerConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        let predictor = Predictor::<DefaultBackend>::load_with_config(
            &config.checkpoint_path,
            Preprocessor::new(config.image_size),
            None,
            &default_device(),
        )?;
        Ok(Self::new(config, predictor))
    }

    /// Run one prediction; blocks for the duration of the forward pass
    ///
    /// The predictor is never mutated, so a lock poisoned by a panicking
    /// request is still safe to use.
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction, ClassifierError> {
        let predictor = self
            .predictor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        predictor.predict_bytes(bytes)
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
pub(crate) mod test_support {
    use burn::module::Param;
    use burn::tensor::{Tensor, TensorData};
    use car_brand_classifier::backend::{default_device, DefaultBackend};
    use car_brand_classifier::inference::Predictor;
    use car_brand_classifier::model::FEATURE_DIM;
    use car_brand_classifier::{ClassifierConfig, Preprocessor};

    /// Predictor over audi/bmw/toyota that always answers "bmw"
    pub fn bmw_predictor(image_size: usize) -> Predictor<DefaultBackend> {
        let device = default_device();
        let mut model = ClassifierConfig::new(3)
            .init::<DefaultBackend>(&device)
            .unwrap();
        model.fc.weight = Param::from_tensor(Tensor::zeros([FEATURE_DIM, 3], &device));
        model.fc.bias = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(vec![-50.0f32, 50.0, -50.0], [3]),
            &device,
        )));

        let class_names = vec!["audi".to_string(), "bmw".to_string(), "toyota".to_string()];
        Predictor::new(model, class_names, Preprocessor::new(image_size), device).unwrap()
    }
}
