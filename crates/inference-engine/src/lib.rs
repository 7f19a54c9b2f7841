//! Coin Inference Engine
//!
//! Runs a classifier over feature vectors and maps its output onto the label
//! table, either behind an anomaly gate or behind a probability threshold.
//! The classifier and detector are external collaborators; a rule-based mock
//! pair is provided until trained models are wired in.

mod engine;
mod label;
mod model;
mod summary;

pub use engine::{Decision, InferenceConfig, InferenceEngine, Prediction, DEFAULT_PROBABILITY_THRESHOLD};
pub use label::{LabelTable, UNKNOWN_LABEL};
pub use model::{Anomaly, AnomalyDetector, Classifier, MockClassifier, MockDetector};
pub use summary::{ContainerSummary, MeasurementOutcome, Outcome, ERROR_BUCKET, SKIPPED_BUCKET};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Operation not supported by this model: {0}")]
    Unsupported(String),
}
