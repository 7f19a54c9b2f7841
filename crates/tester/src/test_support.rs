//! Coin recordings for the tester unit tests

use datafile::{
    ContainerLayout, ContainerSpec, ContainerWriter, Metadata, MetadataValue, NewMeasurement,
};
use num_complex::Complex64;
use std::f64::consts::PI;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Recording with constant resistance (Ohm) and inductance (H) over 1..80 kHz
pub(crate) fn coin(resistance: f64, inductance: f64, reference: bool) -> NewMeasurement {
    let frequency: Vec<f64> = (1..=80).map(|i| i as f64 * 1e3).collect();
    let impedance = frequency
        .iter()
        .map(|f| Complex64::new(resistance, inductance * 2.0 * PI * f))
        .collect();
    NewMeasurement {
        metadata: Metadata::new()
            .with("Measurement description", MetadataValue::Text("coin".into()))
            .with("Reference", MetadataValue::Bool(reference)),
        drive: vec![0.0; 8],
        sense: vec![0.0; 8],
        frequency,
        impedance,
    }
}

pub(crate) fn writer(path: &Path, capacity: usize) -> ContainerWriter {
    let spec = ContainerSpec {
        capacity,
        raw_len: 8,
        bins: 80,
        attributes: vec![("User name".into(), "tester".into())],
    };
    ContainerWriter::create_standard(path, spec).unwrap()
}

pub(crate) fn write_container(path: &Path, rows: &[NewMeasurement]) {
    let mut writer = writer(path, rows.len() + 1);
    for row in rows {
        writer.append(row).unwrap();
    }
}

/// Let the modification time move past the previous write
pub(crate) fn settle() {
    std::thread::sleep(Duration::from_millis(20));
}

/// Fill the first string field of `slot` with bytes and no terminator
pub(crate) fn corrupt_description(path: &Path, slot: usize) {
    let layout = ContainerLayout::read_from(&mut File::open(path).unwrap(), path).unwrap();
    let start = layout.metadata_offset(slot) as usize;
    let mut bytes = std::fs::read(path).unwrap();
    bytes[start..start + layout.fields[0].width].fill(b'x');
    std::fs::write(path, bytes).unwrap();
}
