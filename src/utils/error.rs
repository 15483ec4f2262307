//! Error Handling Module
//!
//! Defines the error type shared by the classifier library, the CLI and the
//! prediction server. Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for car brand classifier operations
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Checkpoint (or pretrained weight) file is missing
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    /// Uploaded or on-disk image is missing, unreadable or not decodable
    #[error("{0}")]
    InvalidImage(String),

    /// Class list length disagrees with the final layer of the model
    #[error("Class count mismatch: expected {expected} classes, found {found}")]
    ClassCountMismatch { expected: usize, found: usize },

    /// Any other failure while serving a request
    #[error("Unexpected failure: {0}")]
    Unexpected(String),

    /// Checkpoint record could not be written or parsed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Error with dataset operations
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tensor data could not be converted
    #[error("Tensor error: {0}")]
    Tensor(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClassifierError {
    /// Whether the error was caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, ClassifierError::InvalidImage(_))
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Serialization(err.to_string())
    }
}

/// Convenience Result type for classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| ClassifierError::Unexpected(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| ClassifierError::Unexpected(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ClassifierError::Unexpected(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| ClassifierError::Unexpected(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClassifierError::Dataset("test error".to_string());
        assert_eq!(format!("{}", err), "Dataset error: test error");
    }

    #[test]
    fn test_invalid_image_message_is_passed_through() {
        let err = ClassifierError::InvalidImage("Invalid or corrupted image file.".to_string());
        assert_eq!(err.to_string(), "Invalid or corrupted image file.");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_class_count_mismatch_display() {
        let err = ClassifierError::ClassCountMismatch {
            expected: 10,
            found: 12,
        };
        assert!(err.to_string().contains("expected 10"));
        assert!(err.to_string().contains("found 12"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_model_not_found_contains_path() {
        let err = ClassifierError::ModelNotFound(PathBuf::from("models/car_brand_model.mpk"));
        assert!(format!("{}", err).contains("car_brand_model.mpk"));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read file");
        assert!(matches!(with_context, Err(ClassifierError::Unexpected(_))));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let with_context = opt.with_context(|| "Value was None".to_string());
        assert!(with_context.is_err());
    }
}
