//! Live tester
//!
//! Follows one container while the device appends to it. The session waits
//! for a reference measurement, then classifies every new measurement against
//! the latest reference. Polling cadence belongs to the caller.

use crate::config::TesterConfig;
use crate::TesterError;
use datafile::{DataFileError, LastMeasurement, MeasurementStore};
use feature_engine::{FeatureError, FeatureExtractor, FeatureVector, ResistanceInductance};
use inference_engine::{ContainerSummary, InferenceEngine, Outcome};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Calibration state of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LiveState {
    AwaitingCalibration,
    Calibrated { reference_index: usize },
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Container not modified since the previous poll
    NoChange,
    /// Container modified without a new measurement
    NoNewMeasurement,
    /// New measurement ignored because no reference was taken yet
    AwaitingReference { measurement_index: usize },
    Calibrated { reference_index: usize },
    Recalibrated { reference_index: usize },
    Classified {
        measurement_index: usize,
        #[serde(flatten)]
        outcome: Outcome,
    },
}

pub struct LiveSession {
    store: MeasurementStore,
    extractor: FeatureExtractor,
    engine: InferenceEngine,
    state: LiveState,
    calibration: Option<ResistanceInductance>,
    /// Measurements seen so far
    seen: usize,
    summary: ContainerSummary,
}

impl LiveSession {
    /// Start a session on `path`; measurements already stored are ignored
    pub fn open(
        path: impl AsRef<Path>,
        config: &TesterConfig,
        engine: InferenceEngine,
    ) -> Result<Self, TesterError> {
        let store = MeasurementStore::open_with_config(path, config.store.clone())?;
        let seen = store.count()?;
        info!(
            "Live session on {} ({} earlier measurements ignored)",
            store.path().display(),
            seen
        );
        Ok(Self {
            store,
            extractor: FeatureExtractor::new(config.features.clone())?,
            summary: ContainerSummary::new(engine.labels()),
            engine,
            state: LiveState::AwaitingCalibration,
            calibration: None,
            seen,
        })
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    /// Outcomes of every classified measurement of the session
    pub fn summary(&self) -> &ContainerSummary {
        &self.summary
    }

    pub fn store(&self) -> &MeasurementStore {
        &self.store
    }

    /// Check the container once and react to its newest measurement
    pub fn poll(&mut self) -> Result<LiveEvent, TesterError> {
        if !self.store.has_changed()? {
            return Ok(LiveEvent::NoChange);
        }
        let count = self.store.count()?;
        if count <= self.seen {
            debug!("Container changed, measurement count still {}", count);
            return Ok(LiveEvent::NoNewMeasurement);
        }
        let passed_over = count - self.seen - 1;
        if passed_over > 0 {
            warn!(
                "{} measurement(s) appended since the last poll were not tested",
                passed_over
            );
        }
        self.seen = count;

        let last = match self
            .store
            .get_last_measurement(self.extractor.config().limit_frequency)
        {
            Ok(last) => last,
            Err(e @ DataFileError::MalformedRecord { .. }) => {
                let measurement_index = count - 1;
                warn!("Measurement {} is unreadable: {}", measurement_index, e);
                let outcome = Outcome::Error {
                    reason: e.to_string(),
                };
                self.summary.record(measurement_index, outcome.clone());
                return Ok(LiveEvent::Classified {
                    measurement_index,
                    outcome,
                });
            }
            Err(e) => return Err(e.into()),
        };
        match self.state {
            LiveState::AwaitingCalibration if last.is_reference => {
                self.calibrate(&last)?;
                info!("Calibration done (measurement {})", last.logical_index);
                Ok(LiveEvent::Calibrated {
                    reference_index: last.logical_index,
                })
            }
            LiveState::AwaitingCalibration => {
                info!(
                    "Measurement {} ignored, take a reference measurement first",
                    last.logical_index
                );
                Ok(LiveEvent::AwaitingReference {
                    measurement_index: last.logical_index,
                })
            }
            LiveState::Calibrated { .. } if last.is_reference => {
                self.calibrate(&last)?;
                info!("Recalibrated on measurement {}", last.logical_index);
                Ok(LiveEvent::Recalibrated {
                    reference_index: last.logical_index,
                })
            }
            LiveState::Calibrated { reference_index } => {
                let outcome = self.classify(&last, reference_index);
                match &outcome {
                    Outcome::Label { label, .. } => info!("Coin is of type: {}", label),
                    Outcome::Skipped { reason } | Outcome::Error { reason } => {
                        warn!("Measurement {} not classified: {}", last.logical_index, reason)
                    }
                }
                self.summary.record(last.logical_index, outcome.clone());
                Ok(LiveEvent::Classified {
                    measurement_index: last.logical_index,
                    outcome,
                })
            }
        }
    }

    fn calibrate(&mut self, reference: &LastMeasurement) -> Result<(), TesterError> {
        let spectrum = ResistanceInductance::from_impedance(&reference.frequency, &reference.impedance)?;
        self.calibration = Some(spectrum);
        self.state = LiveState::Calibrated {
            reference_index: reference.logical_index,
        };
        Ok(())
    }

    fn classify(&self, last: &LastMeasurement, reference_index: usize) -> Outcome {
        let vector = match self.features(last, reference_index) {
            Ok(vector) => vector,
            Err(e) => {
                return Outcome::Error {
                    reason: e.to_string(),
                }
            }
        };
        if let Err(e) = vector.check_evaluable() {
            return Outcome::Skipped {
                reason: e.to_string(),
            };
        }
        match self.engine.classify(&vector) {
            Ok(prediction) => prediction.into(),
            Err(e) => Outcome::Error {
                reason: e.to_string(),
            },
        }
    }

    fn features(&self, last: &LastMeasurement, reference_index: usize) -> Result<FeatureVector, TesterError> {
        let calibration = self.calibration.as_ref().ok_or_else(|| {
            FeatureError::CalibrationUnavailable(self.store.path().display().to_string())
        })?;
        let target = ResistanceInductance::from_impedance(&last.frequency, &last.impedance)?;
        let values = self.extractor.extract(&target, calibration)?;
        Ok(FeatureVector::new(last.logical_index, Some(reference_index), values))
    }
}
