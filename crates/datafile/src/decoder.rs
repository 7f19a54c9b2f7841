//! Record Decoding
//!
//! Turns the raw byte windows of one slot into typed values. Every field is
//! dispatched on its [`FieldKind`]; the byte layout is fixed by the
//! [`SchemaRegistry`] that was built when the container was opened.

use crate::error::DataFileError;
use crate::schema::{FieldKind, SchemaRegistry};
use num_complex::Complex64;
use serde::Serialize;

/// Decoded value of one metadata field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    U16(u16),
    U32(u32),
    U96(u128),
    F32(f32),
    Bool(bool),
}

impl MetadataValue {
    /// Kind this value encodes as
    pub fn kind(&self) -> FieldKind {
        match self {
            MetadataValue::Text(_) => FieldKind::Text,
            MetadataValue::U16(_) => FieldKind::U16,
            MetadataValue::U32(_) => FieldKind::U32,
            MetadataValue::U96(_) => FieldKind::U96,
            MetadataValue::F32(_) => FieldKind::F32,
            MetadataValue::Bool(_) => FieldKind::Bool,
        }
    }

    /// Zero value of a kind, written for fields left unset
    pub fn zero(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => MetadataValue::Text(String::new()),
            FieldKind::U16 => MetadataValue::U16(0),
            FieldKind::U32 => MetadataValue::U32(0),
            FieldKind::U96 => MetadataValue::U96(0),
            FieldKind::F32 => MetadataValue::F32(0.0),
            FieldKind::Bool => MetadataValue::Bool(false),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of any integer-kinded value
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            MetadataValue::U16(v) => Some(*v as u128),
            MetadataValue::U32(v) => Some(*v as u128),
            MetadataValue::U96(v) => Some(*v),
            _ => None,
        }
    }
}

/// Metadata of one measurement, in schema order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: MetadataValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`Metadata::set`]
    pub fn with(mut self, name: impl Into<String>, value: MetadataValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&MetadataValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Whether the `Reference` flag is set
    pub fn is_reference(&self) -> bool {
        self.get(crate::REFERENCE_FIELD)
            .and_then(MetadataValue::as_bool)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn le_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Reassemble a 96-bit value from three 32-bit words, most significant first
pub(crate) fn join_words(words: [u32; 3]) -> u128 {
    ((words[0] as u128) << 64) | ((words[1] as u128) << 32) | words[2] as u128
}

/// Split a 96-bit value into three 32-bit words, most significant first
pub(crate) fn split_words(value: u128) -> [u32; 3] {
    [
        (value >> 64) as u32,
        (value >> 32) as u32,
        value as u32,
    ]
}

fn decode_field(kind: FieldKind, window: &[u8]) -> Result<MetadataValue, DataFileError> {
    let value = match kind {
        FieldKind::Text => {
            let end = window
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| DataFileError::malformed("string field has no terminating zero"))?;
            let text = std::str::from_utf8(&window[..end])
                .map_err(|e| DataFileError::malformed(format!("string field is not UTF-8: {}", e)))?;
            MetadataValue::Text(text.to_string())
        }
        FieldKind::U16 => MetadataValue::U16(le_u16(window)),
        FieldKind::U32 => MetadataValue::U32(le_u32(window)),
        FieldKind::U96 => MetadataValue::U96(join_words([
            le_u32(&window[0..4]),
            le_u32(&window[4..8]),
            le_u32(&window[8..12]),
        ])),
        FieldKind::F32 => MetadataValue::F32(f32::from_bits(le_u32(window))),
        FieldKind::Bool => MetadataValue::Bool(window[0] != 0),
    };
    Ok(value)
}

/// Decode a metadata record
pub fn decode_metadata(registry: &SchemaRegistry, raw: &[u8]) -> Result<Metadata, DataFileError> {
    let size = registry.record_size();
    if raw.len() < size {
        return Err(DataFileError::malformed(format!(
            "metadata block is {} bytes, schema needs {}",
            raw.len(),
            size
        )));
    }

    let mut metadata = Metadata::new();
    for (field, offset, width) in registry.field_offsets() {
        let value = decode_field(field.kind, &raw[offset..offset + width]).map_err(|e| match e {
            DataFileError::MalformedRecord { slot, reason } => DataFileError::MalformedRecord {
                slot,
                reason: format!("field '{}': {}", field.name, reason),
            },
            other => other,
        })?;
        metadata.set(field.name.clone(), value);
    }
    Ok(metadata)
}

/// Encode a metadata record; unset fields are written as zero
pub fn encode_metadata(
    registry: &SchemaRegistry,
    metadata: &Metadata,
) -> Result<Vec<u8>, DataFileError> {
    let mut raw = vec![0u8; registry.record_size()];

    for (field, offset, width) in registry.field_offsets() {
        let zero = MetadataValue::zero(field.kind);
        let value = metadata.get(&field.name).unwrap_or(&zero);
        if value.kind() != field.kind {
            return Err(DataFileError::SchemaViolation {
                field: field.name.clone(),
                reason: format!("expected {:?}, got {:?}", field.kind, value.kind()),
            });
        }

        let window = &mut raw[offset..offset + width];
        match value {
            MetadataValue::Text(s) => {
                // Keep room for the terminating zero
                if s.len() >= width {
                    return Err(DataFileError::SchemaViolation {
                        field: field.name.clone(),
                        reason: format!("{} bytes do not fit a {}-byte window", s.len(), width),
                    });
                }
                window[..s.len()].copy_from_slice(s.as_bytes());
            }
            MetadataValue::U16(v) => window.copy_from_slice(&v.to_le_bytes()),
            MetadataValue::U32(v) => window.copy_from_slice(&v.to_le_bytes()),
            MetadataValue::U96(v) => {
                if *v >> 96 != 0 {
                    return Err(DataFileError::SchemaViolation {
                        field: field.name.clone(),
                        reason: "value exceeds 96 bits".to_string(),
                    });
                }
                for (chunk, word) in window.chunks_exact_mut(4).zip(split_words(*v)) {
                    chunk.copy_from_slice(&word.to_le_bytes());
                }
            }
            MetadataValue::F32(v) => window.copy_from_slice(&v.to_le_bytes()),
            MetadataValue::Bool(b) => window[0] = u8::from(*b),
        }
    }
    Ok(raw)
}

/// Split an impedance block into its frequency axis and complex impedance.
///
/// The block holds three rows of `bins` values: frequency, real part,
/// imaginary part.
pub fn decode_impedance(
    block: &[f64],
    bins: usize,
) -> Result<(Vec<f64>, Vec<Complex64>), DataFileError> {
    if bins == 0 || block.len() % bins != 0 {
        return Err(DataFileError::malformed(format!(
            "impedance block of {} values is not a whole number of {}-bin rows",
            block.len(),
            bins
        )));
    }
    let rows = block.len() / bins;
    if rows != 3 {
        return Err(DataFileError::malformed(format!(
            "impedance block has {} rows, expected 3",
            rows
        )));
    }

    let frequency = block[..bins].to_vec();
    let impedance = block[bins..2 * bins]
        .iter()
        .zip(&block[2 * bins..])
        .map(|(&re, &im)| Complex64::new(re, im))
        .collect();
    Ok((frequency, impedance))
}

/// Split a raw sample block into drive and sense channels
pub fn decode_samples(block: &[f32], len: usize) -> Result<(Vec<f32>, Vec<f32>), DataFileError> {
    if block.len() != 2 * len {
        return Err(DataFileError::malformed(format!(
            "raw block has {} samples, expected 2 x {}",
            block.len(),
            len
        )));
    }
    Ok((block[..len].to_vec(), block[len..].to_vec()))
}
