//! Measurement Store
//!
//! Random access to the measurements of one container. Slots are an
//! append-only arena: logical index `n` is the n-th slot whose existence flag
//! is set, in storage order. Existence flags are re-read on every access so a
//! container that is still being appended to is always seen as of the latest
//! completed record.

use crate::decoder::{decode_impedance, decode_metadata, decode_samples, Metadata};
use crate::error::DataFileError;
use crate::layout::ContainerLayout;
use crate::schema::{SchemaRegistry, DEFAULT_STRING_WIDTH};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Frequency band kept when band limiting is enabled (open interval, Hz)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl Default for FrequencyBand {
    fn default() -> Self {
        Self {
            min_hz: 0.0,
            max_hz: 200e3,
        }
    }
}

impl FrequencyBand {
    /// Whether `f` lies strictly inside the band
    pub fn contains(&self, f: f64) -> bool {
        f > self.min_hz && f < self.max_hz
    }

    /// Indices of the bins inside the band
    pub fn select(&self, frequency: &[f64]) -> Vec<usize> {
        frequency
            .iter()
            .enumerate()
            .filter(|(_, &f)| self.contains(f))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Band applied by band-limited reads
    pub frequency_band: FrequencyBand,
    /// Initial string width of the schema (widened by the container if needed)
    pub string_width: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            frequency_band: FrequencyBand::default(),
            string_width: DEFAULT_STRING_WIDTH,
        }
    }
}

/// One fully decoded measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Position among existing slots
    pub logical_index: usize,
    /// Physical slot
    pub slot: usize,
    pub metadata: Metadata,
    /// Drive voltage samples
    pub drive: Vec<f32>,
    /// Sense voltage samples
    pub sense: Vec<f32>,
    pub frequency: Vec<f64>,
    pub impedance: Vec<Complex64>,
}

/// Impedance of every existing measurement on a shared frequency axis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImpedanceSet {
    pub frequency: Vec<f64>,
    /// One row per existing measurement, in logical order
    pub rows: Vec<Vec<Complex64>>,
}

impl ImpedanceSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Most recent measurement, as consumed by live testing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastMeasurement {
    pub logical_index: usize,
    pub frequency: Vec<f64>,
    pub impedance: Vec<Complex64>,
    pub is_reference: bool,
}

/// Read-only view of a measurement container
pub struct MeasurementStore {
    path: PathBuf,
    config: StoreConfig,
    registry: SchemaRegistry,
    /// Registry at the stored string width, used for decoding
    records: SchemaRegistry,
    /// None while the container has no header yet
    layout: Option<ContainerLayout>,
    last_modified: Option<SystemTime>,
}

fn read_block(file: &mut File, offset: u64, len: u64) -> io::Result<Vec<u8>> {
    let len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "block too large"))?;
    let mut buf = vec![0u8; len];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn f64_values(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}

fn f32_values(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl MeasurementStore {
    /// Open a container with the default configuration
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataFileError> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// Open a container.
    ///
    /// A missing or unreadable path fails with `UnreadableContainer`. An
    /// empty file (no header written yet) opens with zero measurements.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Result<Self, DataFileError> {
        let path = path.as_ref().to_path_buf();
        let fs_meta =
            std::fs::metadata(&path).map_err(|e| DataFileError::unreadable(&path, e.to_string()))?;

        let mut store = Self {
            registry: SchemaRegistry::standard(config.string_width),
            records: SchemaRegistry::standard(config.string_width),
            path,
            config,
            layout: None,
            last_modified: fs_meta.modified().ok(),
        };
        store.probe_layout()?;

        match &store.layout {
            Some(layout) => info!(
                "Opened container {} ({} slots, {} bins, {} raw samples)",
                store.path.display(),
                layout.capacity,
                layout.bins,
                layout.raw_len
            ),
            None => info!("Opened empty container {}", store.path.display()),
        }
        Ok(store)
    }

    /// Read the header if the file has one
    fn probe_layout(&mut self) -> Result<(), DataFileError> {
        let mut file = self.reopen()?;
        let len = file
            .metadata()
            .map_err(|e| DataFileError::unreadable(&self.path, e.to_string()))?
            .len();
        if len == 0 {
            return Ok(());
        }

        let layout = ContainerLayout::read_from(&mut file, &self.path)?;
        layout
            .check_file_len(len)
            .map_err(|reason| DataFileError::unreadable(&self.path, reason))?;
        let mut registry = SchemaRegistry::standard(self.config.string_width);
        let records = layout
            .reconcile(&mut registry)
            .map_err(|reason| DataFileError::unreadable(&self.path, reason))?;
        if records.string_width() < registry.string_width() {
            debug!(
                "{} stores {}-byte strings, decoding at that width",
                self.path.display(),
                records.string_width()
            );
        }

        self.registry = registry;
        self.records = records;
        self.layout = Some(layout);
        Ok(())
    }

    fn reopen(&self) -> Result<File, DataFileError> {
        File::open(&self.path).map_err(|e| DataFileError::unreadable(&self.path, e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Schema in effect for this container (string width possibly widened)
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Schema of the stored records, at exactly the stored string width
    pub fn record_registry(&self) -> &SchemaRegistry {
        &self.records
    }

    /// Number of slots, 0 while the container has no header
    pub fn capacity(&self) -> usize {
        self.layout.as_ref().map_or(0, |l| l.capacity)
    }

    /// File-level attributes from the header
    pub fn file_attributes(&self) -> &[(String, String)] {
        self.layout
            .as_ref()
            .map(|l| l.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// Physical slots with their existence flag set, in storage order
    pub fn existing_slots(&self) -> Result<Vec<usize>, DataFileError> {
        let layout = match &self.layout {
            Some(layout) => layout,
            None => return Ok(Vec::new()),
        };
        let mut file = self.reopen()?;
        let flags = read_block(&mut file, layout.existing_offset(), layout.capacity as u64)
            .map_err(|e| DataFileError::unreadable(&self.path, format!("existence flags: {}", e)))?;
        Ok(flags
            .iter()
            .enumerate()
            .filter(|(_, &flag)| flag != 0)
            .map(|(slot, _)| slot)
            .collect())
    }

    /// Number of existing measurements
    pub fn count(&self) -> Result<usize, DataFileError> {
        Ok(self.existing_slots()?.len())
    }

    /// Map a logical index (negative counts from the end) to (logical, slot)
    fn resolve(index: i64, slots: &[usize]) -> Result<(usize, usize), DataFileError> {
        let count = slots.len();
        let logical = if index < 0 { index + count as i64 } else { index };
        if logical < 0 || logical >= count as i64 {
            return Err(DataFileError::IndexOutOfRange { index, count });
        }
        let logical = logical as usize;
        Ok((logical, slots[logical]))
    }

    fn layout_or_empty(&self, index: i64) -> Result<&ContainerLayout, DataFileError> {
        self.layout
            .as_ref()
            .ok_or(DataFileError::IndexOutOfRange { index, count: 0 })
    }

    fn read_metadata_slot(
        &self,
        file: &mut File,
        layout: &ContainerLayout,
        slot: usize,
    ) -> Result<Metadata, DataFileError> {
        let raw = read_block(file, layout.metadata_offset(slot), layout.record_size() as u64)
            .map_err(|e| DataFileError::malformed(format!("metadata: {}", e)).in_slot(slot))?;
        decode_metadata(&self.records, &raw).map_err(|e| e.in_slot(slot))
    }

    fn read_impedance_slot(
        &self,
        file: &mut File,
        layout: &ContainerLayout,
        slot: usize,
    ) -> Result<(Vec<f64>, Vec<Complex64>), DataFileError> {
        let raw = read_block(file, layout.impedance_offset(slot), layout.impedance_block_len())
            .map_err(|e| DataFileError::malformed(format!("impedance: {}", e)).in_slot(slot))?;
        decode_impedance(&f64_values(&raw), layout.bins).map_err(|e| e.in_slot(slot))
    }

    /// Decode one measurement by logical index
    pub fn get_record(&self, index: i64) -> Result<Measurement, DataFileError> {
        let layout = self.layout_or_empty(index)?;
        let slots = self.existing_slots()?;
        let (logical_index, slot) = Self::resolve(index, &slots)?;
        debug!("Reading measurement {} from slot {}", logical_index, slot);

        let mut file = self.reopen()?;
        let raw = read_block(&mut file, layout.raw_offset(slot), layout.raw_block_len())
            .map_err(|e| DataFileError::malformed(format!("rawdata: {}", e)).in_slot(slot))?;
        let (drive, sense) =
            decode_samples(&f32_values(&raw), layout.raw_len).map_err(|e| e.in_slot(slot))?;
        let (frequency, impedance) = self.read_impedance_slot(&mut file, layout, slot)?;
        let metadata = self.read_metadata_slot(&mut file, layout, slot)?;

        Ok(Measurement {
            logical_index,
            slot,
            metadata,
            drive,
            sense,
            frequency,
            impedance,
        })
    }

    /// Decode only the metadata of one measurement
    pub fn get_metadata(&self, index: i64) -> Result<Metadata, DataFileError> {
        let layout = self.layout_or_empty(index)?;
        let slots = self.existing_slots()?;
        let (_, slot) = Self::resolve(index, &slots)?;
        let mut file = self.reopen()?;
        self.read_metadata_slot(&mut file, layout, slot)
    }

    /// Metadata of every existing measurement, in logical order.
    ///
    /// A malformed record yields an error in its own position and does not
    /// prevent decoding the others.
    pub fn all_metadata(&self) -> Result<Vec<Result<Metadata, DataFileError>>, DataFileError> {
        let layout = match &self.layout {
            Some(layout) => layout,
            None => return Ok(Vec::new()),
        };
        let slots = self.existing_slots()?;
        let mut file = self.reopen()?;
        Ok(slots
            .into_iter()
            .map(|slot| self.read_metadata_slot(&mut file, layout, slot))
            .collect())
    }

    /// Impedance of every existing measurement.
    ///
    /// The frequency axis comes from physical slot 0. With
    /// `limit_frequency`, only bins inside the configured band are kept.
    pub fn get_all_impedances(&self, limit_frequency: bool) -> Result<ImpedanceSet, DataFileError> {
        let layout = match &self.layout {
            Some(layout) if layout.capacity > 0 => layout,
            _ => return Ok(ImpedanceSet::default()),
        };
        let slots = self.existing_slots()?;
        let mut file = self.reopen()?;

        let (frequency, _) = self.read_impedance_slot(&mut file, layout, 0)?;
        let mut rows = Vec::with_capacity(slots.len());
        for slot in slots {
            let (_, z) = self.read_impedance_slot(&mut file, layout, slot)?;
            rows.push(z);
        }

        if !limit_frequency {
            return Ok(ImpedanceSet { frequency, rows });
        }

        let keep = self.config.frequency_band.select(&frequency);
        Ok(ImpedanceSet {
            frequency: keep.iter().map(|&i| frequency[i]).collect(),
            rows: rows
                .into_iter()
                .map(|row| keep.iter().map(|&i| row[i]).collect())
                .collect(),
        })
    }

    /// Most recent measurement with its reference flag
    pub fn get_last_measurement(
        &self,
        limit_frequency: bool,
    ) -> Result<LastMeasurement, DataFileError> {
        let measurement = self.get_record(-1)?;
        let is_reference = measurement.metadata.is_reference();

        let (frequency, impedance) = if limit_frequency {
            let keep = self.config.frequency_band.select(&measurement.frequency);
            (
                keep.iter().map(|&i| measurement.frequency[i]).collect(),
                keep.iter().map(|&i| measurement.impedance[i]).collect(),
            )
        } else {
            (measurement.frequency, measurement.impedance)
        };

        Ok(LastMeasurement {
            logical_index: measurement.logical_index,
            frequency,
            impedance,
            is_reference,
        })
    }

    /// Edge-triggered change check against the file modification time.
    ///
    /// Every call records the current modification time, so two calls with
    /// no write in between return false the second time.
    pub fn has_changed(&mut self) -> Result<bool, DataFileError> {
        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| DataFileError::unreadable(&self.path, e.to_string()))?;
        let changed = self.last_modified != Some(modified);
        self.last_modified = Some(modified);

        if changed && self.layout.is_none() {
            if let Err(e) = self.probe_layout() {
                warn!("Container {} not readable yet: {}", self.path.display(), e);
            }
        }
        Ok(changed)
    }
}
