//! Coin Tester - Main Entry Point

use inference_engine::InferenceEngine;
use std::time::Duration;
use tester::{init_logging, BatchTester, LiveEvent, LiveSession, Mode, TesterConfig};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = TesterConfig::load()?;
    init_logging(&config.logging)?;

    info!("=== Coin Tester v{} ===", env!("CARGO_PKG_VERSION"));

    let engine = InferenceEngine::mock(config.inference.clone())?;
    warn!("No trained models configured, classifying with rule-based mock models");

    match config.mode {
        Mode::Batch => {
            let tester = BatchTester::new(&config, engine)?;
            let reports = tester.process_folder(&config.batch.folder)?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Mode::Live => {
            let mut session = LiveSession::open(&config.live.file, &config, engine)?;
            info!("Please take a reference measurement (one short press in the air)");
            let interval = Duration::from_millis(config.live.poll_interval_ms);
            loop {
                match session.poll()? {
                    LiveEvent::NoChange | LiveEvent::NoNewMeasurement => {}
                    LiveEvent::Calibrated { .. } => {
                        info!("Please measure the coin to be tested (one short press)")
                    }
                    event => println!("{}", serde_json::to_string(&event)?),
                }
                std::thread::sleep(interval);
            }
        }
    }

    Ok(())
}
