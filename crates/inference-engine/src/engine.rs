//! Inference Engine Implementation

use crate::label::LabelTable;
use crate::model::{Anomaly, AnomalyDetector, Classifier, MockClassifier, MockDetector};
use crate::InferenceError;
use feature_engine::FeatureVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default minimum class probability for the thresholding strategy
pub const DEFAULT_PROBABILITY_THRESHOLD: f64 = 0.99;

/// How the "unknown" label is decided
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Decision {
    /// Anomalous vectors are unknown; normal ones go to the classifier
    AnomalyGate,
    /// Unknown when the most probable class is below `threshold`
    ProbabilityThreshold { threshold: f64 },
}

impl Default for Decision {
    fn default() -> Self {
        Decision::ProbabilityThreshold {
            threshold: DEFAULT_PROBABILITY_THRESHOLD,
        }
    }
}

/// Inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub labels: LabelTable,
    pub decision: Decision,
    /// Expected feature vector width
    pub feature_width: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            labels: LabelTable::default(),
            decision: Decision::default(),
            feature_width: 30,
        }
    }
}

/// Classification of one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index into the label table
    pub class_index: usize,
    pub label: String,
    /// Winning class probability, when the classifier reports one
    pub confidence: Option<f64>,
}

/// Classifier with unknown-label decision
pub struct InferenceEngine {
    config: InferenceConfig,
    classifier: Box<dyn Classifier>,
    detector: Option<Box<dyn AnomalyDetector>>,
    mock_mode: bool,
}

impl InferenceEngine {
    /// Create an engine around external models.
    ///
    /// The anomaly gate strategy needs a detector.
    pub fn new(
        config: InferenceConfig,
        classifier: Box<dyn Classifier>,
        detector: Option<Box<dyn AnomalyDetector>>,
    ) -> Result<Self, InferenceError> {
        if config.decision == Decision::AnomalyGate && detector.is_none() {
            return Err(InferenceError::ModelLoadError(
                "anomaly gate strategy requires an anomaly detector".to_string(),
            ));
        }
        if let Decision::ProbabilityThreshold { threshold } = config.decision {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(InferenceError::ModelLoadError(format!(
                    "probability threshold {} outside [0, 1]",
                    threshold
                )));
            }
        }
        if config.labels.len() < 2 {
            return Err(InferenceError::ModelLoadError(
                "label table has no coin labels".to_string(),
            ));
        }

        info!(
            "Creating inference engine: {} labels, {:?}",
            config.labels.len(),
            config.decision
        );
        Ok(Self {
            config,
            classifier,
            detector,
            mock_mode: false,
        })
    }

    /// Create an engine backed by the rule-based mock models
    pub fn mock(config: InferenceConfig) -> Result<Self, InferenceError> {
        let classifier = Box::new(MockClassifier::new(config.labels.len()));
        let detector: Box<dyn AnomalyDetector> = Box::new(MockDetector::default());
        let mut engine = Self::new(config, classifier, Some(detector))?;
        engine.mock_mode = true;
        info!("Inference engine running with mock models");
        Ok(engine)
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn labels(&self) -> &LabelTable {
        &self.config.labels
    }

    pub fn is_mock(&self) -> bool {
        self.mock_mode
    }

    /// Classify one evaluable feature vector
    pub fn classify(&self, features: &FeatureVector) -> Result<Prediction, InferenceError> {
        let values = features.values.as_slice();
        if values.len() != self.config.feature_width {
            return Err(InferenceError::InvalidInputShape {
                expected: self.config.feature_width.to_string(),
                actual: values.len().to_string(),
            });
        }
        if !features.is_evaluable() {
            return Err(InferenceError::InferenceFailed(format!(
                "measurement {} has {} NaN features",
                features.measurement_index,
                features.nan_count()
            )));
        }

        let prediction = match self.config.decision {
            Decision::AnomalyGate => self.gated(values)?,
            Decision::ProbabilityThreshold { threshold } => self.thresholded(values, threshold)?,
        };
        debug!(
            "Measurement {} classified as {}",
            features.measurement_index, prediction.label
        );
        Ok(prediction)
    }

    fn gated(&self, values: &[f64]) -> Result<Prediction, InferenceError> {
        let detector = self
            .detector
            .as_ref()
            .ok_or_else(|| InferenceError::ModelLoadError("no anomaly detector".to_string()))?;

        if detector.predict(values)? == Anomaly::Anomalous {
            return Ok(self.unknown(None));
        }
        let class_index = self.classifier.predict(values)?;
        self.labelled(class_index, None)
    }

    fn thresholded(&self, values: &[f64], threshold: f64) -> Result<Prediction, InferenceError> {
        let proba = self.classifier.predict_proba(values)?;
        if proba.len() != self.config.labels.len() {
            return Err(InferenceError::InferenceFailed(format!(
                "classifier returned {} probabilities for {} labels",
                proba.len(),
                self.config.labels.len()
            )));
        }

        let (class_index, &confidence) = proba
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .ok_or_else(|| InferenceError::InferenceFailed("empty probabilities".to_string()))?;

        if confidence < threshold {
            debug!(
                "Best class {} at {:.3} is below threshold {}",
                class_index, confidence, threshold
            );
            return Ok(self.unknown(Some(confidence)));
        }
        self.labelled(class_index, Some(confidence))
    }

    fn unknown(&self, confidence: Option<f64>) -> Prediction {
        Prediction {
            class_index: 0,
            label: self.config.labels.unknown().to_string(),
            confidence,
        }
    }

    fn labelled(&self, class_index: usize, confidence: Option<f64>) -> Result<Prediction, InferenceError> {
        match self.config.labels.name(class_index) {
            Some(label) => Ok(Prediction {
                class_index,
                label: label.to_string(),
                confidence,
            }),
            None => {
                warn!("Classifier returned unknown class index {}", class_index);
                Err(InferenceError::InferenceFailed(format!(
                    "class index {} outside label table of {}",
                    class_index,
                    self.config.labels.len()
                )))
            }
        }
    }
}
