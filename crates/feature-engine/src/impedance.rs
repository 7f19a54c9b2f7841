//! Resistance and Inductance from Complex Impedance

use crate::error::FeatureError;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Per-bin resistance and inductance of one measurement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResistanceInductance {
    /// Re(Z) (Ohm)
    pub resistance: Vec<f64>,
    /// Im(Z) / (2 pi f) (H)
    pub inductance: Vec<f64>,
}

impl ResistanceInductance {
    /// Split impedance into resistance and inductance.
    ///
    /// A 0 Hz bin yields a non-finite inductance; band-limited reads exclude it.
    pub fn from_impedance(frequency: &[f64], impedance: &[Complex64]) -> Result<Self, FeatureError> {
        if frequency.len() != impedance.len() {
            return Err(FeatureError::ShapeMismatch {
                expected: frequency.len(),
                actual: impedance.len(),
            });
        }

        let resistance = impedance.iter().map(|z| z.re).collect();
        let inductance = impedance
            .iter()
            .zip(frequency)
            .map(|(z, &f)| z.im / (2.0 * PI * f))
            .collect();
        Ok(Self {
            resistance,
            inductance,
        })
    }

    pub fn len(&self) -> usize {
        self.resistance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resistance.is_empty()
    }

    /// Subtract a reference measurement bin by bin
    pub fn calibrated(&self, reference: &Self) -> Result<Self, FeatureError> {
        if reference.len() != self.len() {
            return Err(FeatureError::ShapeMismatch {
                expected: self.len(),
                actual: reference.len(),
            });
        }
        Ok(Self {
            resistance: self
                .resistance
                .iter()
                .zip(&reference.resistance)
                .map(|(r, r_cal)| r - r_cal)
                .collect(),
            inductance: self
                .inductance
                .iter()
                .zip(&reference.inductance)
                .map(|(l, l_cal)| l - l_cal)
                .collect(),
        })
    }
}
