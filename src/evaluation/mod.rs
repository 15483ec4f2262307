//! Evaluation module: checkpoint scoring on a held-out test folder

pub mod evaluator;

pub use evaluator::{evaluate_checkpoint, EvaluationReport, Evaluator};
