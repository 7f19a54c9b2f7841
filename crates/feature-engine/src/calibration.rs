//! Calibration Reference Resolution
//!
//! Finds the measurements flagged as references and decides which reference
//! calibrates which measurement.

use datafile::{DataFileError, MeasurementStore};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Measurement whose metadata could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedMeasurement {
    pub measurement_index: usize,
    pub reason: String,
}

/// Reference flags of a whole container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceScan {
    pub references: BTreeSet<usize>,
    /// Measurements that are neither references nor classifiable
    pub rejected: Vec<RejectedMeasurement>,
}

/// Read the `Reference` flag of every measurement.
///
/// Records whose metadata cannot be decoded are reported in `rejected`
/// instead of failing the scan.
pub fn scan_references(store: &MeasurementStore) -> Result<ReferenceScan, DataFileError> {
    let mut scan = ReferenceScan::default();
    for (index, metadata) in store.all_metadata()?.into_iter().enumerate() {
        match metadata {
            Ok(metadata) if metadata.is_reference() => {
                scan.references.insert(index);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Measurement {} of {} is unreadable: {}",
                    index,
                    store.path().display(),
                    e
                );
                scan.rejected.push(RejectedMeasurement {
                    measurement_index: index,
                    reason: e.to_string(),
                });
            }
        }
    }
    debug!(
        "Found {} reference measurement(s) in {}",
        scan.references.len(),
        store.path().display()
    );
    Ok(scan)
}

/// Logical indices of every measurement whose `Reference` flag is set.
///
/// An empty set means calibration is unavailable for this container.
pub fn find_reference_indices(store: &MeasurementStore) -> Result<BTreeSet<usize>, DataFileError> {
    Ok(scan_references(store)?.references)
}

/// Whether a single measurement is a reference
pub fn is_reference(store: &MeasurementStore, index: i64) -> Result<bool, DataFileError> {
    Ok(store.get_metadata(index)?.is_reference())
}

/// Reference used to calibrate each of `count` measurements.
///
/// Each measurement uses the closest reference recorded before it; those
/// recorded before the first reference use the first one. Reference rows get
/// `None`. With a single reference this broadcasts it over every other row.
pub fn assign_references(references: &BTreeSet<usize>, count: usize) -> Vec<Option<usize>> {
    let first = match references.iter().next() {
        Some(&first) => first,
        None => return vec![None; count],
    };

    (0..count)
        .map(|row| {
            if references.contains(&row) {
                None
            } else {
                Some(references.range(..row).next_back().copied().unwrap_or(first))
            }
        })
        .collect()
}
