//! Tester configuration

use datafile::StoreConfig;
use feature_engine::FeatureConfig;
use inference_engine::InferenceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_FILE_ENV: &str = "COIN_TESTER_CONFIG";

/// Configuration file read when `COIN_TESTER_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "coin-tester.toml";

/// Prefix of override variables, e.g. `COIN_TESTER__LIVE__POLL_INTERVAL_MS`
pub const ENV_PREFIX: &str = "COIN_TESTER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Classify every test container of a folder once
    Batch,
    /// Follow a single container while it is being recorded
    Live,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level (trace, debug, info, warn, error)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Folder holding the test containers
    pub folder: PathBuf,
    pub file_prefix: String,
    pub extension: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("data/tests"),
            file_prefix: "test_set_".to_string(),
            extension: "iss".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Container written by the device during the session
    pub file: PathBuf,
    /// Delay between change checks (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("data/live.iss"),
            poll_interval_ms: 500,
        }
    }
}

/// Complete tester configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    pub mode: Mode,
    pub batch: BatchConfig,
    pub live: LiveConfig,
    pub store: StoreConfig,
    pub features: FeatureConfig,
    pub inference: InferenceConfig,
    pub logging: LoggingConfig,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Batch,
            batch: BatchConfig::default(),
            live: LiveConfig::default(),
            store: StoreConfig::default(),
            features: FeatureConfig::default(),
            inference: InferenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TesterConfig {
    /// Load from `COIN_TESTER_CONFIG` (required) or `coin-tester.toml`
    /// (optional), then apply `COIN_TESTER__*` overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        match std::env::var_os(CONFIG_FILE_ENV) {
            Some(path) => Self::build(Some((Path::new(&path), true)), true),
            None => Self::build(Some((Path::new(DEFAULT_CONFIG_FILE), false)), true),
        }
    }

    /// Load from a configuration file only
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        Self::build(Some((path.as_ref(), true)), false)
    }

    fn build(file: Option<(&Path, bool)>, with_env: bool) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some((path, required)) = file {
            builder = builder.add_source(config::File::from(path).required(required));
        }
        if with_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inference_engine::Decision;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TesterConfig::default();
        assert_eq!(config.mode, Mode::Batch);
        assert_eq!(config.batch.file_prefix, "test_set_");
        assert_eq!(config.features.width(), 30);
        assert_eq!(config.inference.feature_width, config.features.width());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coin-tester.toml");
        std::fs::write(
            &path,
            r#"
mode = "live"

[live]
file = "/tmp/session.iss"
poll_interval_ms = 100

[inference.decision]
strategy = "anomaly_gate"
"#,
        )
        .unwrap();

        let config = TesterConfig::from_file(&path).unwrap();
        assert_eq!(config.mode, Mode::Live);
        assert_eq!(config.live.file, PathBuf::from("/tmp/session.iss"));
        assert_eq!(config.live.poll_interval_ms, 100);
        assert_eq!(config.inference.decision, Decision::AnomalyGate);
        assert_eq!(config.batch.extension, "iss");
        assert_eq!(config.inference.labels.len(), 8);
    }

    #[test]
    fn test_missing_required_file() {
        let dir = TempDir::new().unwrap();
        assert!(TesterConfig::from_file(dir.path().join("absent.toml")).is_err());
    }
}
