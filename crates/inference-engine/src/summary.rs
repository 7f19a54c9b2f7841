//! Per-Container Outcome Summary

use crate::engine::Prediction;
use crate::label::LabelTable;
use serde::Serialize;
use std::collections::BTreeMap;

/// Bucket of measurements excluded before classification
pub const SKIPPED_BUCKET: &str = "skipped";

/// Bucket of measurements whose classification failed
pub const ERROR_BUCKET: &str = "error";

/// What happened to one measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Label {
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f64>,
    },
    Skipped { reason: String },
    Error { reason: String },
}

impl Outcome {
    /// Summary bucket this outcome is counted in
    pub fn bucket(&self) -> &str {
        match self {
            Outcome::Label { label, .. } => label.as_str(),
            Outcome::Skipped { .. } => SKIPPED_BUCKET,
            Outcome::Error { .. } => ERROR_BUCKET,
        }
    }
}

impl From<Prediction> for Outcome {
    fn from(prediction: Prediction) -> Self {
        Outcome::Label {
            label: prediction.label,
            confidence: prediction.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementOutcome {
    pub measurement_index: usize,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Counts per label plus the skipped and error buckets, with details
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerSummary {
    pub counts: BTreeMap<String, usize>,
    pub details: Vec<MeasurementOutcome>,
}

impl ContainerSummary {
    /// Empty summary with a zero count for every label and bucket
    pub fn new(labels: &LabelTable) -> Self {
        let counts = labels
            .iter()
            .chain([SKIPPED_BUCKET, ERROR_BUCKET])
            .map(|bucket| (bucket.to_string(), 0))
            .collect();
        Self {
            counts,
            details: Vec::new(),
        }
    }

    pub fn record(&mut self, measurement_index: usize, outcome: Outcome) {
        *self.counts.entry(outcome.bucket().to_string()).or_insert(0) += 1;
        self.details.push(MeasurementOutcome {
            measurement_index,
            outcome,
        });
    }

    pub fn count(&self, bucket: &str) -> usize {
        self.counts.get(bucket).copied().unwrap_or(0)
    }

    /// Number of recorded measurements
    pub fn total(&self) -> usize {
        self.details.len()
    }

    pub fn skipped(&self) -> usize {
        self.count(SKIPPED_BUCKET)
    }

    pub fn errors(&self) -> usize {
        self.count(ERROR_BUCKET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_bucket() {
        let mut summary = ContainerSummary::new(&LabelTable::default());
        assert_eq!(summary.counts.len(), 10);
        assert_eq!(summary.count("2_CHF"), 0);

        summary.record(
            1,
            Outcome::Label {
                label: "2_CHF".into(),
                confidence: Some(0.995),
            },
        );
        summary.record(2, Outcome::Skipped { reason: "NaN".into() });
        summary.record(3, Outcome::Error { reason: "shape".into() });
        summary.record(
            4,
            Outcome::Label {
                label: "2_CHF".into(),
                confidence: None,
            },
        );

        assert_eq!(summary.count("2_CHF"), 2);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.errors(), 1);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_detail_format() {
        let detail = MeasurementOutcome {
            measurement_index: 3,
            outcome: Outcome::Skipped {
                reason: "non-evaluable".into(),
            },
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["measurement_index"], 3);
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "non-evaluable");
    }
}
