//! Container Layout
//!
//! Header codec and section offsets of a measurement container.
//!
//! ```text
//! header | existing[cap] u8 | rawdata[cap][2][N] f32 | impedance[cap][3][M] f64 | metadata[cap][record]
//! ```
//!
//! All values are little-endian.

use crate::error::DataFileError;
use crate::schema::{FieldKind, FieldSpec, SchemaRegistry};
use std::io::{self, Read, Write};
use std::path::Path;

/// File magic
pub const MAGIC: [u8; 4] = *b"ISSF";

/// Supported container format version
pub const FORMAT_VERSION: u16 = 1;

/// Bytes per raw sample
const SAMPLE_BYTES: u64 = 4;

/// Bytes per impedance value
const VALUE_BYTES: u64 = 8;

/// Field as declared in a container header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredField {
    pub spec: FieldSpec,
    pub width: usize,
}

/// Parsed container header with derived section offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    /// Number of slots
    pub capacity: usize,
    /// Samples per raw channel
    pub raw_len: usize,
    /// Frequency bins per impedance row
    pub bins: usize,
    /// Stored width of string fields
    pub string_width: usize,
    /// Metadata fields in stored order
    pub fields: Vec<StoredField>,
    /// File-level string attributes
    pub attributes: Vec<(String, String)>,
}

fn read_u16(r: &mut impl Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_string(r: &mut impl Read) -> io::Result<String> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_string(w: &mut impl Write, s: &str) -> io::Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "header string too long"))?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(s.as_bytes())
}

impl ContainerLayout {
    /// Layout for a registry, as a writer would declare it
    pub fn for_registry(
        registry: &SchemaRegistry,
        capacity: usize,
        raw_len: usize,
        bins: usize,
        attributes: Vec<(String, String)>,
    ) -> Self {
        let fields = registry
            .fields()
            .iter()
            .map(|spec| StoredField {
                spec: spec.clone(),
                width: registry.width_of(spec.kind),
            })
            .collect();
        Self {
            capacity,
            raw_len,
            bins,
            string_width: registry.string_width(),
            fields,
            attributes,
        }
    }

    /// Parse a header
    pub fn read_from(r: &mut impl Read, path: &Path) -> Result<Self, DataFileError> {
        Self::parse(r).map_err(|e| {
            let reason = if e.kind() == io::ErrorKind::UnexpectedEof {
                "truncated header".to_string()
            } else {
                e.to_string()
            };
            DataFileError::unreadable(path, reason)
        })
    }

    fn parse(r: &mut impl Read) -> io::Result<Self> {
        let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(invalid(format!("bad magic {:02X?}", magic)));
        }
        let version = read_u16(r)?;
        if version != FORMAT_VERSION {
            return Err(invalid(format!("unsupported format version {}", version)));
        }
        let _flags = read_u16(r)?;

        let capacity = read_u32(r)? as usize;
        let raw_len = read_u32(r)? as usize;
        let bins = read_u32(r)? as usize;
        let string_width = read_u32(r)? as usize;
        let field_count = read_u16(r)? as usize;
        let attribute_count = read_u16(r)? as usize;

        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let name = read_string(r)?;
            let mut tag = [0u8; 1];
            r.read_exact(&mut tag)?;
            let kind = FieldKind::from_tag(tag[0])
                .ok_or_else(|| invalid(format!("unknown kind tag {} for '{}'", tag[0], name)))?;
            let width = read_u32(r)? as usize;
            fields.push(StoredField {
                spec: FieldSpec::new(name, kind),
                width,
            });
        }

        let mut attributes = Vec::with_capacity(attribute_count);
        for _ in 0..attribute_count {
            let key = read_string(r)?;
            let value = read_string(r)?;
            attributes.push((key, value));
        }

        Ok(Self {
            capacity,
            raw_len,
            bins,
            string_width,
            fields,
            attributes,
        })
    }

    /// Serialize the header
    pub fn write_to(&self, w: &mut impl Write) -> io::Result<()> {
        let to_u32 = |v: usize| {
            u32::try_from(v)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "header value too large"))
        };
        let to_u16 = |v: usize| {
            u16::try_from(v)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "header count too large"))
        };

        w.write_all(&MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        w.write_all(&0u16.to_le_bytes())?;
        w.write_all(&to_u32(self.capacity)?.to_le_bytes())?;
        w.write_all(&to_u32(self.raw_len)?.to_le_bytes())?;
        w.write_all(&to_u32(self.bins)?.to_le_bytes())?;
        w.write_all(&to_u32(self.string_width)?.to_le_bytes())?;
        w.write_all(&to_u16(self.fields.len())?.to_le_bytes())?;
        w.write_all(&to_u16(self.attributes.len())?.to_le_bytes())?;

        for field in &self.fields {
            write_string(w, &field.spec.name)?;
            w.write_all(&[field.spec.kind.tag()])?;
            w.write_all(&to_u32(field.width)?.to_le_bytes())?;
        }
        for (key, value) in &self.attributes {
            write_string(w, key)?;
            write_string(w, value)?;
        }
        Ok(())
    }

    /// Widen `registry` to the stored string width and check that the stored
    /// fields match it name for name, kind for kind, width for width.
    ///
    /// Returns the registry records are decoded and encoded with: the same
    /// fields at exactly the stored string width, which may be narrower than
    /// the widened one.
    pub fn reconcile(&self, registry: &mut SchemaRegistry) -> Result<SchemaRegistry, String> {
        registry.widen_strings(self.string_width);
        let records = registry.with_string_width(self.string_width);

        if self.fields.len() != records.fields().len() {
            return Err(format!(
                "container declares {} metadata fields, schema has {}",
                self.fields.len(),
                records.fields().len()
            ));
        }
        for (stored, expected) in self.fields.iter().zip(records.fields()) {
            if stored.spec != *expected {
                return Err(format!(
                    "field '{}' ({:?}) does not match schema field '{}' ({:?})",
                    stored.spec.name, stored.spec.kind, expected.name, expected.kind
                ));
            }
            let width = records.width_of(expected.kind);
            if stored.width != width {
                return Err(format!(
                    "field '{}' is {} bytes wide, schema expects {}",
                    stored.spec.name, stored.width, width
                ));
            }
        }
        Ok(records)
    }

    /// Check the declared sections against the real file length.
    ///
    /// Offsets and block lengths are only meaningful once this passed.
    pub fn check_file_len(&self, actual: u64) -> Result<(), String> {
        match self.file_len() {
            Some(declared) if declared <= actual => Ok(()),
            Some(declared) => Err(format!(
                "header declares {} bytes, file has {}",
                declared, actual
            )),
            None => Err(format!(
                "header sizes overflow (capacity {}, raw length {}, bins {})",
                self.capacity, self.raw_len, self.bins
            )),
        }
    }

    /// Bytes of one metadata record
    pub fn record_size(&self) -> usize {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// Encoded header length
    pub fn header_len(&self) -> u64 {
        let strings: usize = self.fields.iter().map(|f| 2 + f.spec.name.len() + 1 + 4).sum::<usize>()
            + self
                .attributes
                .iter()
                .map(|(k, v)| 4 + k.len() + v.len())
                .sum::<usize>();
        (4 + 2 + 2 + 4 * 4 + 2 + 2 + strings) as u64
    }

    pub fn existing_offset(&self) -> u64 {
        self.header_len()
    }

    /// Bytes of one slot's raw block
    pub fn raw_block_len(&self) -> u64 {
        2 * self.raw_len as u64 * SAMPLE_BYTES
    }

    /// Bytes of one slot's impedance block
    pub fn impedance_block_len(&self) -> u64 {
        3 * self.bins as u64 * VALUE_BYTES
    }

    pub fn raw_offset(&self, slot: usize) -> u64 {
        self.existing_offset() + self.capacity as u64 + slot as u64 * self.raw_block_len()
    }

    pub fn impedance_offset(&self, slot: usize) -> u64 {
        self.raw_offset(self.capacity) + slot as u64 * self.impedance_block_len()
    }

    pub fn metadata_offset(&self, slot: usize) -> u64 {
        self.impedance_offset(self.capacity) + (slot * self.record_size()) as u64
    }

    /// Total file length once every section is allocated, `None` when it
    /// does not fit in a `u64`
    pub fn file_len(&self) -> Option<u64> {
        let capacity = self.capacity as u64;
        let raw = (self.raw_len as u64).checked_mul(2 * SAMPLE_BYTES)?;
        let impedance = (self.bins as u64).checked_mul(3 * VALUE_BYTES)?;
        let record = self
            .fields
            .iter()
            .try_fold(0u64, |sum, f| sum.checked_add(f.width as u64))?;
        self.header_len()
            .checked_add(capacity)?
            .checked_add(capacity.checked_mul(raw)?)?
            .checked_add(capacity.checked_mul(impedance)?)?
            .checked_add(capacity.checked_mul(record)?)
    }
}
