//! Inference module
//!
//! Single-image prediction with a loaded checkpoint. The HTTP service and the
//! `infer` CLI command are both thin wrappers around [`Predictor`].

pub mod predictor;

pub use predictor::{to_percent, ClassScore, Prediction, Predictor};
