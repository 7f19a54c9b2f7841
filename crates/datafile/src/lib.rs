//! Measurement Container Access
//!
//! Reads (and writes) the slot-oriented binary containers produced by the
//! inductive sensing device: a self-describing header, an existence flag per
//! slot, raw drive/sense samples, impedance blocks and a compound metadata
//! record per slot.

mod decoder;
mod error;
mod layout;
mod schema;
mod store;
mod writer;

pub use decoder::{
    decode_impedance, decode_metadata, decode_samples, encode_metadata, Metadata, MetadataValue,
};
pub use error::DataFileError;
pub use layout::{ContainerLayout, StoredField, FORMAT_VERSION, MAGIC};
pub use schema::{FieldKind, FieldSpec, SchemaRegistry, DEFAULT_STRING_WIDTH};
pub use store::{
    FrequencyBand, ImpedanceSet, LastMeasurement, Measurement, MeasurementStore, StoreConfig,
};
pub use writer::{
    ContainerSpec, ContainerWriter, NewMeasurement, DEFAULT_RAW_LEN, SOFTWARE_VERSION,
};

/// Name of the metadata flag marking a calibration measurement
pub const REFERENCE_FIELD: &str = "Reference";
