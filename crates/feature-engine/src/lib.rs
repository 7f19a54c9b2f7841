//! Feature Engineering Engine
//!
//! Calibrates impedance spectra against reference measurements and turns
//! them into fixed-width resistance/inductance feature vectors.

mod calibration;
mod error;
mod features;
mod impedance;
#[cfg(test)]
mod test_support;

pub use calibration::{
    assign_references, find_reference_indices, is_reference, scan_references, ReferenceScan,
    RejectedMeasurement,
};
pub use error::FeatureError;
pub use features::{ContainerFeatures, FeatureConfig, FeatureExtractor, FeatureVector, RATIO_WIDTH};
pub use impedance::ResistanceInductance;
