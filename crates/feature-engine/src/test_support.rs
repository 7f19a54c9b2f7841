//! Container fixtures shared by the unit tests

use datafile::{
    ContainerLayout, ContainerSpec, ContainerWriter, Metadata, MetadataValue, NewMeasurement,
};
use num_complex::Complex64;
use std::f64::consts::PI;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Bins per fixture measurement, enough for the default feature lists
pub(crate) const BINS: usize = 80;

/// 1 kHz .. 80 kHz, all inside the default band
pub(crate) fn frequency() -> Vec<f64> {
    (1..=BINS).map(|i| i as f64 * 1e3).collect()
}

/// Measurement with the same resistance and inductance in every bin
pub(crate) fn flat(resistance: f64, inductance: f64, reference: bool) -> NewMeasurement {
    let frequency = frequency();
    let impedance = frequency
        .iter()
        .map(|f| Complex64::new(resistance, inductance * 2.0 * PI * f))
        .collect();
    NewMeasurement {
        metadata: Metadata::new().with("Reference", MetadataValue::Bool(reference)),
        drive: vec![0.0; 4],
        sense: vec![0.0; 4],
        frequency,
        impedance,
    }
}

/// Write a container holding `rows` in consecutive slots
pub(crate) fn container(dir: &TempDir, name: &str, rows: &[NewMeasurement]) -> PathBuf {
    let path = dir.path().join(name);
    let spec = ContainerSpec {
        capacity: rows.len().max(1) + 2,
        raw_len: 4,
        bins: BINS,
        attributes: Vec::new(),
    };
    let mut writer = ContainerWriter::create_standard(&path, spec).unwrap();
    for row in rows {
        writer.append(row).unwrap();
    }
    path
}

/// Fill the first string field of `slot` with bytes and no terminator
pub(crate) fn corrupt_description(path: &Path, slot: usize) {
    let layout = ContainerLayout::read_from(&mut File::open(path).unwrap(), path).unwrap();
    let start = layout.metadata_offset(slot) as usize;
    let mut bytes = std::fs::read(path).unwrap();
    bytes[start..start + layout.fields[0].width].fill(b'x');
    std::fs::write(path, bytes).unwrap();
}
