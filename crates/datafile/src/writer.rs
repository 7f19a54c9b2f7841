//! Container Writer
//!
//! Creates containers and appends measurements. Slot data is written before
//! the slot's existence flag, so a reader never sees a flagged slot whose
//! record is incomplete.

use crate::decoder::{encode_metadata, Metadata, MetadataValue};
use crate::error::DataFileError;
use crate::layout::ContainerLayout;
use crate::schema::SchemaRegistry;
use num_complex::Complex64;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Version stamped into records that do not carry one
pub const SOFTWARE_VERSION: &str = "1.0";

/// Number of raw samples per channel written by the device
pub const DEFAULT_RAW_LEN: usize = 500;

/// Shape of a new container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub capacity: usize,
    pub raw_len: usize,
    pub bins: usize,
    /// File-level attributes (e.g. `User name`, `File description`)
    pub attributes: Vec<(String, String)>,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        Self {
            capacity: 1000,
            raw_len: DEFAULT_RAW_LEN,
            bins: 100,
            attributes: Vec::new(),
        }
    }
}

/// Data of one measurement to store
#[derive(Debug, Clone, Default)]
pub struct NewMeasurement {
    pub metadata: Metadata,
    pub drive: Vec<f32>,
    pub sense: Vec<f32>,
    pub frequency: Vec<f64>,
    pub impedance: Vec<Complex64>,
}

/// Appending writer for one container
pub struct ContainerWriter {
    path: PathBuf,
    file: File,
    layout: ContainerLayout,
    registry: SchemaRegistry,
    next_slot: usize,
}

impl ContainerWriter {
    /// Create (or truncate) a container for the standard schema
    pub fn create_standard(path: impl AsRef<Path>, spec: ContainerSpec) -> Result<Self, DataFileError> {
        Self::create(path, spec, SchemaRegistry::default())
    }

    /// Create (or truncate) a container; string fields use the registry's width
    pub fn create(
        path: impl AsRef<Path>,
        spec: ContainerSpec,
        registry: SchemaRegistry,
    ) -> Result<Self, DataFileError> {
        let path = path.as_ref().to_path_buf();
        let layout = ContainerLayout::for_registry(
            &registry,
            spec.capacity,
            spec.raw_len,
            spec.bins,
            spec.attributes,
        );
        let file_len = layout.file_len().ok_or_else(|| DataFileError::SchemaViolation {
            field: "capacity".to_string(),
            reason: format!(
                "{} slots of {} bins do not fit in one file",
                layout.capacity, layout.bins
            ),
        })?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        layout.write_to(&mut file)?;
        // Zero-fill every section; all slots start empty
        file.set_len(file_len)?;
        file.flush()?;

        info!(
            "Created container {} ({} slots, {} bins)",
            path.display(),
            layout.capacity,
            layout.bins
        );
        Ok(Self {
            path,
            file,
            layout,
            registry,
            next_slot: 0,
        })
    }

    /// Open an existing standard-schema container for appending; records are
    /// encoded at the container's own string width
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self, DataFileError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| DataFileError::unreadable(&path, e.to_string()))?;

        let layout = ContainerLayout::read_from(&mut file, &path)?;
        let len = file.metadata()?.len();
        layout
            .check_file_len(len)
            .map_err(|reason| DataFileError::unreadable(&path, reason))?;
        let registry = layout
            .reconcile(&mut SchemaRegistry::default())
            .map_err(|reason| DataFileError::unreadable(&path, reason))?;

        let mut flags = vec![0u8; layout.capacity];
        file.seek(SeekFrom::Start(layout.existing_offset()))?;
        file.read_exact(&mut flags)?;
        let next_slot = flags.iter().rposition(|&f| f != 0).map_or(0, |last| last + 1);

        debug!("Appending to {} from slot {}", path.display(), next_slot);
        Ok(Self {
            path,
            file,
            layout,
            registry,
            next_slot,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Append into the slot after the last used one; returns the slot
    pub fn append(&mut self, measurement: &NewMeasurement) -> Result<usize, DataFileError> {
        let slot = self.next_slot;
        if slot >= self.layout.capacity {
            return Err(DataFileError::ContainerFull {
                capacity: self.layout.capacity,
            });
        }
        self.write_slot(slot, measurement)?;
        Ok(slot)
    }

    /// Write a measurement into a specific slot and flag it as existing
    pub fn write_slot(
        &mut self,
        slot: usize,
        measurement: &NewMeasurement,
    ) -> Result<(), DataFileError> {
        if slot >= self.layout.capacity {
            return Err(DataFileError::IndexOutOfRange {
                index: slot as i64,
                count: self.layout.capacity,
            });
        }
        self.check_shape(measurement)?;
        let metadata = encode_metadata(&self.registry, &self.stamped(&measurement.metadata))?;

        let mut raw = Vec::with_capacity(self.layout.raw_block_len() as usize);
        for sample in measurement.drive.iter().chain(&measurement.sense) {
            raw.extend_from_slice(&sample.to_le_bytes());
        }
        let mut impedance = Vec::with_capacity(self.layout.impedance_block_len() as usize);
        let rows = measurement
            .frequency
            .iter()
            .copied()
            .chain(measurement.impedance.iter().map(|z| z.re))
            .chain(measurement.impedance.iter().map(|z| z.im));
        for value in rows {
            impedance.extend_from_slice(&value.to_le_bytes());
        }

        self.write_at(self.layout.raw_offset(slot), &raw)?;
        self.write_at(self.layout.impedance_offset(slot), &impedance)?;
        self.write_at(self.layout.metadata_offset(slot), &metadata)?;
        self.file.sync_data()?;
        self.write_at(self.layout.existing_offset() + slot as u64, &[1])?;
        self.file.flush()?;

        self.next_slot = self.next_slot.max(slot + 1);
        debug!("Wrote measurement into slot {}", slot);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), DataFileError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn check_shape(&self, m: &NewMeasurement) -> Result<(), DataFileError> {
        let violation = |field: &str, expected: usize, actual: usize| DataFileError::SchemaViolation {
            field: field.to_string(),
            reason: format!("expected {} values, got {}", expected, actual),
        };
        let raw_len = self.layout.raw_len;
        let bins = self.layout.bins;
        if m.drive.len() != raw_len {
            return Err(violation("rawdata.drive", raw_len, m.drive.len()));
        }
        if m.sense.len() != raw_len {
            return Err(violation("rawdata.sense", raw_len, m.sense.len()));
        }
        if m.frequency.len() != bins {
            return Err(violation("impedance.frequency", bins, m.frequency.len()));
        }
        if m.impedance.len() != bins {
            return Err(violation("impedance.values", bins, m.impedance.len()));
        }
        Ok(())
    }

    /// Fill the timestamp and software version when the caller left them out
    fn stamped(&self, metadata: &Metadata) -> Metadata {
        let mut metadata = metadata.clone();
        if metadata.get("Date and time").is_none() {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            metadata.set("Date and time", MetadataValue::Text(now));
        }
        if metadata.get("Software version").is_none() {
            metadata.set("Software version", MetadataValue::Text(SOFTWARE_VERSION.to_string()));
        }
        metadata
    }
}
