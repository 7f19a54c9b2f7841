//! Feature Extraction Error Types

use datafile::DataFileError;
use thiserror::Error;

/// Errors during calibration or feature extraction
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Container holds no reference measurement
    #[error("Calibration unavailable: no reference measurement in {0}")]
    CalibrationUnavailable(String),

    /// Feature vector contains NaN and cannot be classified
    #[error("Feature vector of measurement {measurement_index} is not evaluable ({nan_count} NaN values)")]
    NonEvaluable {
        measurement_index: usize,
        nan_count: usize,
    },

    /// Feature bin lists are inconsistent
    #[error("Invalid feature configuration: {0}")]
    InvalidConfig(String),

    /// Selected bin does not exist in the (band-limited) spectrum
    #[error("Feature bin {bin} out of range ({bins} frequency bins)")]
    BinOutOfRange { bin: usize, bins: usize },

    /// Arrays that must align do not
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Container access failed
    #[error(transparent)]
    DataFile(#[from] DataFileError),
}
