//! Feature Vector Assembly
//!
//! Calibrated resistance and inductance are sampled at fixed bins and
//! extended with their ratio:
//!
//! ```text
//! [ R'[featureListR] | L'[featureListL] | R'_sel[0..9] / L'_sel ]
//! ```

use crate::calibration::{assign_references, scan_references, RejectedMeasurement};
use crate::error::FeatureError;
use crate::impedance::ResistanceInductance;
use datafile::MeasurementStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Number of ratio features, and the required length of the inductance list
pub const RATIO_WIDTH: usize = 9;

/// Feature bin selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Bins sampled from calibrated resistance
    pub resistance_bins: Vec<usize>,
    /// Bins sampled from calibrated inductance
    pub inductance_bins: Vec<usize>,
    /// Restrict the spectrum to the store's frequency band before selection
    pub limit_frequency: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            resistance_bins: vec![17, 20, 21, 22, 26, 28, 31, 32, 39, 42, 44, 71],
            inductance_bins: vec![4, 5, 6, 7, 8, 9, 10, 12, 61],
            limit_frequency: true,
        }
    }
}

impl FeatureConfig {
    /// Check the list lengths required by the ratio features
    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.inductance_bins.len() != RATIO_WIDTH {
            return Err(FeatureError::InvalidConfig(format!(
                "inductance bin list must have exactly {} entries, has {}",
                RATIO_WIDTH,
                self.inductance_bins.len()
            )));
        }
        if self.resistance_bins.len() < RATIO_WIDTH {
            return Err(FeatureError::InvalidConfig(format!(
                "resistance bin list must have at least {} entries, has {}",
                RATIO_WIDTH,
                self.resistance_bins.len()
            )));
        }
        Ok(())
    }

    /// Length of every feature vector built with this configuration
    pub fn width(&self) -> usize {
        self.resistance_bins.len() + self.inductance_bins.len() + RATIO_WIDTH
    }

    /// Number of spectrum bins the selection needs
    fn required_bins(&self) -> usize {
        self.resistance_bins
            .iter()
            .chain(&self.inductance_bins)
            .max()
            .map_or(0, |&max| max + 1)
    }
}

/// Feature vector of one measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    /// Logical index of the measurement in its container
    pub measurement_index: usize,
    /// Reference it was calibrated against
    pub reference_index: Option<usize>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn new(measurement_index: usize, reference_index: Option<usize>, values: Vec<f64>) -> Self {
        Self {
            measurement_index,
            reference_index,
            values,
        }
    }

    pub fn nan_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// Vectors holding NaN are never handed to a classifier
    pub fn is_evaluable(&self) -> bool {
        self.nan_count() == 0
    }

    pub fn check_evaluable(&self) -> Result<&Self, FeatureError> {
        match self.nan_count() {
            0 => Ok(self),
            nan_count => Err(FeatureError::NonEvaluable {
                measurement_index: self.measurement_index,
                nan_count,
            }),
        }
    }
}

/// Feature vectors of every non-reference measurement of a container
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerFeatures {
    /// Frequency axis the bins were selected from
    pub frequency: Vec<f64>,
    /// Logical indices of the reference measurements
    pub references: Vec<usize>,
    /// One vector per non-reference measurement, in logical order
    pub vectors: Vec<FeatureVector>,
    /// Measurements left out because their metadata could not be decoded
    pub rejected: Vec<RejectedMeasurement>,
}

impl ContainerFeatures {
    /// Measurements covered by this pass, references and rejected ones included
    pub fn measurement_count(&self) -> usize {
        self.references.len() + self.vectors.len() + self.rejected.len()
    }
}

/// Builds feature vectors from calibrated impedance
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    /// Create an extractor; fails on inconsistent bin lists
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn width(&self) -> usize {
        self.config.width()
    }

    fn check_bins(&self, bins: usize) -> Result<(), FeatureError> {
        let required = self.config.required_bins();
        if required > bins {
            return Err(FeatureError::BinOutOfRange {
                bin: required - 1,
                bins,
            });
        }
        Ok(())
    }

    /// Feature values of `target` calibrated against `reference`.
    ///
    /// Calibrated inductance that is exactly zero turns into NaN, so both the
    /// inductance feature and its ratio are NaN.
    pub fn extract(
        &self,
        target: &ResistanceInductance,
        reference: &ResistanceInductance,
    ) -> Result<Vec<f64>, FeatureError> {
        self.check_bins(target.len())?;
        let calibrated = target.calibrated(reference)?;

        let resistance: Vec<f64> = self
            .config
            .resistance_bins
            .iter()
            .map(|&bin| calibrated.resistance[bin])
            .collect();
        let inductance: Vec<f64> = self
            .config
            .inductance_bins
            .iter()
            .map(|&bin| match calibrated.inductance[bin] {
                l if l == 0.0 => f64::NAN,
                l => l,
            })
            .collect();

        let mut values = Vec::with_capacity(self.width());
        values.extend_from_slice(&resistance);
        values.extend_from_slice(&inductance);
        values.extend(resistance.iter().zip(&inductance).map(|(r, l)| r / l));
        Ok(values)
    }

    /// Feature vectors of every non-reference measurement of a container.
    ///
    /// Fails with `CalibrationUnavailable` when the container holds no
    /// reference measurement.
    pub fn extract_container(&self, store: &MeasurementStore) -> Result<ContainerFeatures, FeatureError> {
        let impedances = store.get_all_impedances(self.config.limit_frequency)?;
        // A record appended between the two reads is not part of this pass
        let scan = scan_references(store)?;
        let references: BTreeSet<usize> = scan
            .references
            .into_iter()
            .filter(|&i| i < impedances.len())
            .collect();
        let rejected: Vec<RejectedMeasurement> = scan
            .rejected
            .into_iter()
            .filter(|r| r.measurement_index < impedances.len())
            .collect();

        if references.is_empty() {
            warn!("No reference measurement in {}", store.path().display());
            return Err(FeatureError::CalibrationUnavailable(
                store.path().display().to_string(),
            ));
        }
        self.check_bins(impedances.frequency.len())?;

        let spectra = impedances
            .rows
            .iter()
            .map(|row| ResistanceInductance::from_impedance(&impedances.frequency, row))
            .collect::<Result<Vec<_>, _>>()?;

        let assignment = assign_references(&references, spectra.len());
        let mut vectors = Vec::with_capacity(spectra.len().saturating_sub(references.len()));
        for (index, reference) in assignment.into_iter().enumerate() {
            let Some(reference) = reference else { continue };
            if rejected.iter().any(|r| r.measurement_index == index) {
                continue;
            }
            let values = self.extract(&spectra[index], &spectra[reference])?;
            let vector = FeatureVector::new(index, Some(reference), values);
            if !vector.is_evaluable() {
                debug!(
                    "Measurement {} has {} NaN features",
                    index,
                    vector.nan_count()
                );
            }
            vectors.push(vector);
        }

        info!(
            "Extracted {} feature vectors from {} ({} references, {} unreadable)",
            vectors.len(),
            store.path().display(),
            references.len(),
            rejected.len()
        );
        Ok(ContainerFeatures {
            frequency: impedances.frequency,
            references: references.into_iter().collect(),
            vectors,
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{container, corrupt_description, flat, BINS};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn uniform(resistance: f64, inductance: f64, bins: usize) -> ResistanceInductance {
        ResistanceInductance {
            resistance: vec![resistance; bins],
            inductance: vec![inductance; bins],
        }
    }

    #[test]
    fn test_default_width() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        assert_eq!(extractor.width(), 30);
    }

    #[test]
    fn test_invalid_lists_rejected() {
        let mut config = FeatureConfig::default();
        config.inductance_bins.pop();
        assert!(matches!(
            FeatureExtractor::new(config),
            Err(FeatureError::InvalidConfig(_))
        ));

        let config = FeatureConfig {
            resistance_bins: vec![1, 2, 3],
            ..FeatureConfig::default()
        };
        assert!(matches!(
            FeatureExtractor::new(config),
            Err(FeatureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_calibrated_ratio() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let values = extractor
            .extract(&uniform(15.0, 3.0, BINS), &uniform(10.0, 2.0, BINS))
            .unwrap();

        assert_eq!(values.len(), 30);
        assert!(values[..12].iter().all(|&r| r == 5.0));
        assert!(values[12..21].iter().all(|&l| l == 1.0));
        assert_eq!(&values[21..], &[5.0; 9]);
    }

    #[test]
    fn test_zero_inductance_is_nan() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let mut target = uniform(15.0, 3.0, BINS);
        // Bin 6 is the third inductance feature
        target.inductance[6] = 2.0;
        let values = extractor.extract(&target, &uniform(10.0, 2.0, BINS)).unwrap();

        assert!(values[14].is_nan());
        assert!(values[23].is_nan());
        let vector = FeatureVector::new(1, Some(0), values);
        assert_eq!(vector.nan_count(), 2);
        assert!(matches!(
            vector.check_evaluable(),
            Err(FeatureError::NonEvaluable { measurement_index: 1, nan_count: 2 })
        ));
    }

    #[test]
    fn test_bin_out_of_range() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let err = extractor
            .extract(&uniform(1.0, 1.0, 50), &uniform(0.0, 0.0, 50))
            .unwrap_err();
        assert!(matches!(err, FeatureError::BinOutOfRange { bin: 71, bins: 50 }));
    }

    #[test]
    fn test_container_scenario() {
        let dir = TempDir::new().unwrap();
        let path = container(&dir, "test_set_1.iss", &[flat(10.0, 2.0, true), flat(15.0, 3.0, false)]);
        let store = MeasurementStore::open(&path).unwrap();
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();

        let features = extractor.extract_container(&store).unwrap();
        assert_eq!(features.references, vec![0]);
        assert_eq!(features.frequency.len(), BINS);
        assert_eq!(features.vectors.len(), 1);

        let vector = &features.vectors[0];
        assert_eq!(vector.measurement_index, 1);
        assert_eq!(vector.reference_index, Some(0));
        assert!(vector.is_evaluable());
        assert!(vector.values[..12].iter().all(|&r| (r - 5.0).abs() < 1e-9));
        assert!(vector.values[12..21].iter().all(|&l| (l - 1.0).abs() < 1e-9));
        assert!(vector.values[21..].iter().all(|&p| (p - 5.0).abs() < 1e-6));
    }

    #[test]
    fn test_container_identical_inductance_not_evaluable() {
        let dir = TempDir::new().unwrap();
        let path = container(&dir, "test_set_2.iss", &[flat(10.0, 2.0, true), flat(15.0, 2.0, false)]);
        let store = MeasurementStore::open(&path).unwrap();
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();

        let features = extractor.extract_container(&store).unwrap();
        assert_eq!(features.vectors.len(), 1);
        assert!(!features.vectors[0].is_evaluable());
        assert_eq!(features.vectors[0].nan_count(), 2 * RATIO_WIDTH);
    }

    #[test]
    fn test_container_without_reference() {
        let dir = TempDir::new().unwrap();
        let path = container(&dir, "test_set_3.iss", &[flat(15.0, 3.0, false), flat(16.0, 3.0, false)]);
        let store = MeasurementStore::open(&path).unwrap();
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();

        assert!(matches!(
            extractor.extract_container(&store),
            Err(FeatureError::CalibrationUnavailable(_))
        ));
    }

    #[test]
    fn test_container_uses_preceding_reference() {
        let dir = TempDir::new().unwrap();
        let rows = [
            flat(20.0, 3.0, false),
            flat(10.0, 2.0, true),
            flat(20.0, 3.0, false),
            flat(12.0, 2.5, true),
            flat(20.0, 3.0, false),
        ];
        let path = container(&dir, "test_set_4.iss", &rows);
        let store = MeasurementStore::open(&path).unwrap();
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();

        let features = extractor.extract_container(&store).unwrap();
        assert_eq!(features.references, vec![1, 3]);
        let pairs: Vec<_> = features
            .vectors
            .iter()
            .map(|v| (v.measurement_index, v.reference_index))
            .collect();
        assert_eq!(pairs, vec![(0, Some(1)), (2, Some(1)), (4, Some(3))]);
        assert!((features.vectors[2].values[0] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_container_reports_unreadable_rows() {
        let dir = TempDir::new().unwrap();
        let rows = [
            flat(10.0, 2.0, true),
            flat(15.0, 3.0, false),
            flat(15.0, 3.0, false),
        ];
        let path = container(&dir, "test_set_5.iss", &rows);
        corrupt_description(&path, 2);
        let store = MeasurementStore::open(&path).unwrap();
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();

        let features = extractor.extract_container(&store).unwrap();
        assert_eq!(features.vectors.len(), 1);
        assert_eq!(features.vectors[0].measurement_index, 1);
        assert_eq!(features.rejected.len(), 1);
        assert_eq!(features.rejected[0].measurement_index, 2);
        assert_eq!(features.measurement_count(), 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_container_width_is_constant(
            reference_at in 0usize..6,
            coins in proptest::collection::vec((1.0f64..50.0, 1.0f64..5.0), 1..6),
        ) {
            let dir = TempDir::new().unwrap();
            let mut rows: Vec<_> = coins.iter().map(|&(r, l)| flat(r, l, false)).collect();
            let reference_at = reference_at.min(rows.len());
            rows.insert(reference_at, flat(10.0, 2.0, true));
            let path = container(&dir, "width.iss", &rows);
            let store = MeasurementStore::open(&path).unwrap();
            let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();

            let features = extractor.extract_container(&store).unwrap();
            prop_assert_eq!(features.vectors.len(), coins.len());
            for vector in &features.vectors {
                prop_assert_eq!(vector.values.len(), extractor.width());
            }
        }
    }

    proptest! {
        #[test]
        fn prop_width_is_constant(
            r in -1e3f64..1e3,
            l in 1e-6f64..1e-2,
            r_cal in -1e3f64..1e3,
            l_cal in 1e-6f64..1e-2,
        ) {
            let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
            let values = extractor
                .extract(&uniform(r, l, BINS), &uniform(r_cal, l_cal, BINS))
                .unwrap();
            prop_assert_eq!(values.len(), extractor.width());
        }
    }
}
