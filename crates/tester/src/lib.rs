//! Coin Tester
//!
//! Batch classification of recorded test containers and live classification
//! of a container while the device is writing it.

mod batch;
mod config;
mod live;
#[cfg(test)]
mod test_support;

pub use batch::{container_id, BatchTester, ContainerReport};
pub use self::config::{
    BatchConfig, LiveConfig, LoggingConfig, Mode, TesterConfig, CONFIG_FILE_ENV,
    DEFAULT_CONFIG_FILE, ENV_PREFIX,
};
pub use live::{LiveEvent, LiveSession, LiveState};

use datafile::DataFileError;
use feature_engine::FeatureError;
use inference_engine::InferenceError;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Errors of the tester front end
#[derive(Debug, Error)]
pub enum TesterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error(transparent)]
    DataFile(#[from] DataFileError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), TesterError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| TesterError::Logging(format!("unknown log level '{}'", config.level)))?;

    let builder = FmtSubscriber::builder().with_max_level(level).with_target(true);
    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| TesterError::Logging(e.to_string()))
}
