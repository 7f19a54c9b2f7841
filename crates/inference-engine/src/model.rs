//! Model Contracts
//!
//! A classifier maps a feature vector to a class index of the label table; an
//! anomaly detector decides whether the vector looks like any known coin.

use crate::InferenceError;
use feature_engine::RATIO_WIDTH;
use serde::{Deserialize, Serialize};

/// Multi-class coin classifier
pub trait Classifier: Send + Sync {
    /// Index into the label table
    fn predict(&self, features: &[f64]) -> Result<usize, InferenceError>;

    /// Probability of every label, in label table order
    fn predict_proba(&self, _features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        Err(InferenceError::Unsupported("predict_proba".to_string()))
    }
}

/// Detector verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anomaly {
    Normal,
    Anomalous,
}

/// Novelty detector run ahead of the classifier
pub trait AnomalyDetector: Send + Sync {
    fn predict(&self, features: &[f64]) -> Result<Anomaly, InferenceError>;
}

/// Mean of the calibrated resistance features
fn mean_resistance(features: &[f64]) -> Option<f64> {
    let count = features.len().checked_sub(2 * RATIO_WIDTH).filter(|&n| n > 0)?;
    Some(features[..count].iter().sum::<f64>() / count as f64)
}

fn too_short(features: &[f64]) -> InferenceError {
    InferenceError::InvalidInputShape {
        expected: format!("more than {} features", 2 * RATIO_WIDTH),
        actual: features.len().to_string(),
    }
}

/// Rule-based stand-in for a trained classifier.
///
/// Picks the coin class nearest to the mean calibrated resistance (class `k`
/// centred on `k` Ohm) with a confidence that falls off with the distance.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    classes: usize,
}

impl MockClassifier {
    /// `classes` counts every label, the unknown label included
    pub fn new(classes: usize) -> Self {
        Self { classes }
    }

    fn nearest(&self, features: &[f64]) -> Result<(usize, f64), InferenceError> {
        let mean = mean_resistance(features).ok_or_else(|| too_short(features))?;
        if !mean.is_finite() || self.classes < 2 {
            return Err(InferenceError::InferenceFailed(format!(
                "cannot place mean resistance {} among {} classes",
                mean, self.classes
            )));
        }
        let class = mean.round().clamp(1.0, (self.classes - 1) as f64);
        let confidence = (1.0 - (mean - class).abs()).clamp(0.0, 1.0);
        Ok((class as usize, confidence))
    }
}

impl Classifier for MockClassifier {
    fn predict(&self, features: &[f64]) -> Result<usize, InferenceError> {
        Ok(self.nearest(features)?.0)
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let (class, confidence) = self.nearest(features)?;
        let others = self.classes - 2;
        let rest = if others > 0 {
            (1.0 - confidence) / others as f64
        } else {
            0.0
        };

        let mut proba = vec![rest; self.classes];
        proba[0] = 0.0;
        proba[class] = confidence;
        Ok(proba)
    }
}

/// Rule-based stand-in for a trained novelty detector.
///
/// A vector is anomalous when a value is not finite or when the calibrated
/// resistance did not rise above `min_resistance` (nothing on the sensor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDetector {
    pub min_resistance: f64,
}

impl Default for MockDetector {
    fn default() -> Self {
        Self { min_resistance: 0.5 }
    }
}

impl AnomalyDetector for MockDetector {
    fn predict(&self, features: &[f64]) -> Result<Anomaly, InferenceError> {
        let mean = mean_resistance(features).ok_or_else(|| too_short(features))?;
        if features.iter().any(|v| !v.is_finite()) || mean < self.min_resistance {
            Ok(Anomaly::Anomalous)
        } else {
            Ok(Anomaly::Normal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(resistance: f64) -> Vec<f64> {
        let mut values = vec![resistance; 12];
        values.extend([1.0; 9]);
        values.extend([resistance; 9]);
        values
    }

    #[test]
    fn test_mock_classifier_nearest_class() {
        let classifier = MockClassifier::new(8);
        assert_eq!(classifier.predict(&features(3.0)).unwrap(), 3);
        assert_eq!(classifier.predict(&features(5.4)).unwrap(), 5);
        assert_eq!(classifier.predict(&features(40.0)).unwrap(), 7);
        assert_eq!(classifier.predict(&features(-2.0)).unwrap(), 1);
    }

    #[test]
    fn test_mock_probabilities() {
        let classifier = MockClassifier::new(8);
        let proba = classifier.predict_proba(&features(2.25)).unwrap();
        assert_eq!(proba.len(), 8);
        assert_eq!(proba[0], 0.0);
        assert!((proba[2] - 0.75).abs() < 1e-12);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_input_rejected() {
        let classifier = MockClassifier::new(8);
        assert!(matches!(
            classifier.predict(&[1.0; 18]),
            Err(InferenceError::InvalidInputShape { .. })
        ));
    }

    #[test]
    fn test_mock_detector() {
        let detector = MockDetector::default();
        assert_eq!(detector.predict(&features(5.0)).unwrap(), Anomaly::Normal);
        assert_eq!(detector.predict(&features(0.1)).unwrap(), Anomaly::Anomalous);

        let mut values = features(5.0);
        values[25] = f64::INFINITY;
        assert_eq!(detector.predict(&values).unwrap(), Anomaly::Anomalous);
    }

    struct LabelOnly;

    impl Classifier for LabelOnly {
        fn predict(&self, _features: &[f64]) -> Result<usize, InferenceError> {
            Ok(1)
        }
    }

    #[test]
    fn test_predict_proba_optional() {
        assert!(matches!(
            LabelOnly.predict_proba(&features(1.0)),
            Err(InferenceError::Unsupported(_))
        ));
    }
}
