//! Batch tester
//!
//! Classifies every measurement of every test container in a folder. A
//! container that cannot be read or calibrated is reported and skipped; a
//! measurement that cannot be classified is counted and skipped.

use crate::config::TesterConfig;
use crate::TesterError;
use datafile::{MeasurementStore, StoreConfig};
use feature_engine::{FeatureExtractor, FeatureVector};
use inference_engine::{ContainerSummary, InferenceEngine, Outcome};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Identifier of a test container: the file-name suffix after the last `_`
pub fn container_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.rsplit_once('_') {
        Some((_, id)) => id.to_string(),
        None => stem,
    }
}

/// Result of testing one container
#[derive(Debug, Clone, Serialize)]
pub struct ContainerReport {
    pub container_id: String,
    pub path: PathBuf,
    /// Existing measurements, references included
    pub measurements: usize,
    pub references: Vec<usize>,
    pub summary: ContainerSummary,
    /// Why the container was skipped as a whole
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContainerReport {
    pub fn is_skipped(&self) -> bool {
        self.error.is_some()
    }
}

/// Folder-wide batch tester
pub struct BatchTester {
    store_config: StoreConfig,
    extractor: FeatureExtractor,
    engine: InferenceEngine,
    file_prefix: String,
    extension: String,
}

impl BatchTester {
    pub fn new(config: &TesterConfig, engine: InferenceEngine) -> Result<Self, TesterError> {
        Ok(Self {
            store_config: config.store.clone(),
            extractor: FeatureExtractor::new(config.features.clone())?,
            engine,
            file_prefix: config.batch.file_prefix.clone(),
            extension: config.batch.extension.clone(),
        })
    }

    /// Test containers of `folder`, sorted by name
    pub fn container_files(&self, folder: &Path) -> Result<Vec<PathBuf>, TesterError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name_matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&self.file_prefix));
            let extension_matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e == self.extension);
            if name_matches && extension_matches {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Test every container of `folder`; a failing container never stops the batch
    pub fn process_folder(&self, folder: &Path) -> Result<Vec<ContainerReport>, TesterError> {
        let files = self.container_files(folder)?;
        if files.is_empty() {
            warn!("No test containers found in {}", folder.display());
            return Ok(Vec::new());
        }
        info!("Found {} test containers in {}", files.len(), folder.display());

        let reports = files
            .iter()
            .map(|path| {
                self.process_container(path).unwrap_or_else(|e| {
                    warn!("Skipping container {}: {}", path.display(), e);
                    ContainerReport {
                        container_id: container_id(path),
                        path: path.clone(),
                        measurements: 0,
                        references: Vec::new(),
                        summary: ContainerSummary::new(self.engine.labels()),
                        error: Some(e.to_string()),
                    }
                })
            })
            .collect();
        Ok(reports)
    }

    /// Test one container.
    ///
    /// Fails when the container is unreadable or holds no reference.
    pub fn process_container(&self, path: &Path) -> Result<ContainerReport, TesterError> {
        let store = MeasurementStore::open_with_config(path, self.store_config.clone())?;
        let features = self.extractor.extract_container(&store)?;
        let measurements = features.measurement_count();

        let mut outcomes: Vec<(usize, Outcome)> = features
            .vectors
            .iter()
            .map(|vector| (vector.measurement_index, self.classify(vector)))
            .chain(features.rejected.iter().map(|rejected| {
                (
                    rejected.measurement_index,
                    Outcome::Error {
                        reason: rejected.reason.clone(),
                    },
                )
            }))
            .collect();
        outcomes.sort_by_key(|(index, _)| *index);

        let mut summary = ContainerSummary::new(self.engine.labels());
        for (index, outcome) in outcomes {
            summary.record(index, outcome);
        }

        let id = container_id(path);
        info!(
            "Container {}: {} measurements, {} skipped, {} errors",
            id,
            summary.total(),
            summary.skipped(),
            summary.errors()
        );
        Ok(ContainerReport {
            container_id: id,
            path: path.to_path_buf(),
            measurements,
            references: features.references,
            summary,
            error: None,
        })
    }

    fn classify(&self, vector: &FeatureVector) -> Outcome {
        if let Err(e) = vector.check_evaluable() {
            debug!("{}", e);
            return Outcome::Skipped {
                reason: e.to_string(),
            };
        }
        match self.engine.classify(vector) {
            Ok(prediction) => prediction.into(),
            Err(e) => {
                warn!("Measurement {} not classified: {}", vector.measurement_index, e);
                Outcome::Error {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{coin, corrupt_description, write_container};
    use inference_engine::InferenceConfig;
    use tempfile::TempDir;

    fn tester() -> BatchTester {
        let config = TesterConfig::default();
        let engine = InferenceEngine::mock(config.inference.clone()).unwrap();
        BatchTester::new(&config, engine).unwrap()
    }

    #[test]
    fn test_container_id() {
        assert_eq!(container_id(Path::new("data/test_set_12.iss")), "12");
        assert_eq!(container_id(Path::new("plain.iss")), "plain");
    }

    #[test]
    fn test_classifies_calibrated_coins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_set_1.iss");
        write_container(
            &path,
            &[
                coin(10.0, 2e-3, true),
                coin(15.0, 3e-3, false),
                coin(15.0, 3e-3, false),
            ],
        );

        let report = tester().process_container(&path).unwrap();
        assert_eq!(report.container_id, "1");
        assert_eq!(report.measurements, 3);
        assert_eq!(report.references, vec![0]);
        assert_eq!(report.summary.count("1_CHF"), 2);
        assert_eq!(report.summary.skipped(), 0);
        assert_eq!(report.summary.total(), 2);
    }

    #[test]
    fn test_nan_vector_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_set_2.iss");
        write_container(&path, &[coin(10.0, 2e-3, true), coin(15.0, 2e-3, false)]);

        let report = tester().process_container(&path).unwrap();
        assert_eq!(report.summary.skipped(), 1);
        assert_eq!(report.summary.errors(), 0);
        assert!(matches!(report.summary.details[0].outcome, Outcome::Skipped { .. }));
    }

    #[test]
    fn test_width_mismatch_is_counted_as_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_set_3.iss");
        write_container(&path, &[coin(10.0, 2e-3, true), coin(15.0, 3e-3, false)]);

        let config = TesterConfig::default();
        let inference = InferenceConfig {
            feature_width: 31,
            ..InferenceConfig::default()
        };
        let tester = BatchTester::new(&config, InferenceEngine::mock(inference).unwrap()).unwrap();

        let report = tester.process_container(&path).unwrap();
        assert_eq!(report.summary.errors(), 1);
        assert_eq!(report.summary.total(), 1);
    }

    #[test]
    fn test_unreadable_measurement_is_counted_as_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_set_6.iss");
        write_container(
            &path,
            &[
                coin(10.0, 2e-3, true),
                coin(15.0, 3e-3, false),
                coin(15.0, 3e-3, false),
            ],
        );
        corrupt_description(&path, 1);

        let report = tester().process_container(&path).unwrap();
        assert_eq!(report.measurements, 3);
        assert_eq!(report.summary.errors(), 1);
        assert_eq!(report.summary.count("1_CHF"), 1);
        assert_eq!(report.summary.total(), 2);
        assert_eq!(report.summary.details[0].measurement_index, 1);
        assert!(matches!(report.summary.details[0].outcome, Outcome::Error { .. }));
    }

    #[test]
    fn test_folder_moves_past_bad_containers() {
        let dir = TempDir::new().unwrap();
        write_container(
            &dir.path().join("test_set_1.iss"),
            &[coin(10.0, 2e-3, true), coin(13.0, 3e-3, false)],
        );
        write_container(
            &dir.path().join("test_set_2.iss"),
            &[coin(13.0, 3e-3, false)],
        );
        std::fs::write(dir.path().join("test_set_3.iss"), b"not a container").unwrap();
        write_container(&dir.path().join("other_4.iss"), &[coin(10.0, 2e-3, true)]);
        std::fs::write(dir.path().join("test_set_5.txt"), b"notes").unwrap();

        let reports = tester().process_folder(dir.path()).unwrap();
        let ids: Vec<_> = reports.iter().map(|r| r.container_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);

        assert!(!reports[0].is_skipped());
        assert_eq!(reports[0].summary.count("20_CTS"), 1);
        assert!(reports[1].error.as_deref().unwrap().contains("Calibration unavailable"));
        assert!(reports[2].is_skipped());
    }

    #[test]
    fn test_empty_folder() {
        let dir = TempDir::new().unwrap();
        assert!(tester().process_folder(dir.path()).unwrap().is_empty());
    }
}
