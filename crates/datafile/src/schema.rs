//! Metadata Schema Registry
//!
//! Describes the compound metadata record stored per slot: field names,
//! their kinds and the number of bytes each kind occupies.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default byte width of every string field
pub const DEFAULT_STRING_WIDTH: usize = 50;

/// Encoded kind of a metadata field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldKind {
    /// Unsigned 16-bit integer
    U16 = 0,
    /// 96-bit unsigned integer stored as three 32-bit words
    U96 = 1,
    /// 32-bit float
    F32 = 2,
    /// Zero-terminated UTF-8 string in a fixed-width window
    Text = 3,
    /// Boolean stored as one byte
    Bool = 4,
    /// Unsigned 32-bit integer
    U32 = 5,
}

impl FieldKind {
    /// Tag written in the container header
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Parse a header tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FieldKind::U16),
            1 => Some(FieldKind::U96),
            2 => Some(FieldKind::F32),
            3 => Some(FieldKind::Text),
            4 => Some(FieldKind::Bool),
            5 => Some(FieldKind::U32),
            _ => None,
        }
    }

    /// Number of bytes this kind occupies in a record
    pub fn encoded_width(&self, string_width: usize) -> usize {
        match self {
            FieldKind::U16 => 2,
            FieldKind::U96 => 12,
            FieldKind::F32 | FieldKind::U32 => 4,
            FieldKind::Text => string_width,
            FieldKind::Bool => 1,
        }
    }
}

/// Name and kind of one metadata field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered metadata schema
///
/// Field order is significant: byte offsets inside a record are the running
/// sum of the preceding field widths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    fields: Vec<FieldSpec>,
    string_width: usize,
}

impl SchemaRegistry {
    /// Merge base fields with transport fields.
    ///
    /// A transport field named like a base field replaces the base kind but
    /// keeps the base position.
    pub fn new(base: Vec<FieldSpec>, transport: Vec<FieldSpec>, string_width: usize) -> Self {
        let mut fields = base;
        for field in transport {
            match fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => existing.kind = field.kind,
                None => fields.push(field),
            }
        }
        Self {
            fields,
            string_width,
        }
    }

    /// Registry of the standard device schema
    pub fn standard(string_width: usize) -> Self {
        Self::new(Self::base_fields(), Self::device_fields(), string_width)
    }

    /// Fields written by the acquisition software itself
    pub fn base_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("Measurement description", FieldKind::Text),
            FieldSpec::new("Measurement UID", FieldKind::U32),
            FieldSpec::new("Date and time", FieldKind::Text),
            FieldSpec::new("Software version", FieldKind::Text),
        ]
    }

    /// Fields reported by the device over its serial link
    pub fn device_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("Reference", FieldKind::Bool),
            FieldSpec::new("Number of points", FieldKind::U16),
            FieldSpec::new("Number of sequences", FieldKind::U16),
            FieldSpec::new("Shunt resistor [Ohm]", FieldKind::U16),
            FieldSpec::new("Reference voltage [V]", FieldKind::F32),
            FieldSpec::new("Sampling frequency [Hz]", FieldKind::F32),
            FieldSpec::new("Device UID", FieldKind::U96),
            FieldSpec::new("Hardware version", FieldKind::Text),
            FieldSpec::new("Firmware version", FieldKind::Text),
        ]
    }

    /// Kind of a named field
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    /// Field names in declaration order
    pub fn ordered_field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn string_width(&self) -> usize {
        self.string_width
    }

    /// Widen string fields to at least `width` bytes.
    ///
    /// Returns true if the width grew. Never shrinks.
    pub fn widen_strings(&mut self, width: usize) -> bool {
        if width > self.string_width {
            debug!(
                "Widening string fields from {} to {} bytes",
                self.string_width, width
            );
            self.string_width = width;
            true
        } else {
            false
        }
    }

    /// Copy of this registry whose string fields are exactly `width` bytes
    pub fn with_string_width(&self, width: usize) -> Self {
        Self {
            fields: self.fields.clone(),
            string_width: width,
        }
    }

    /// Encoded width of one field
    pub fn width_of(&self, kind: FieldKind) -> usize {
        kind.encoded_width(self.string_width)
    }

    /// Total bytes of one metadata record
    pub fn record_size(&self) -> usize {
        self.fields.iter().map(|f| self.width_of(f.kind)).sum()
    }

    /// Fields with their byte offset and width inside a record
    pub fn field_offsets(&self) -> Vec<(&FieldSpec, usize, usize)> {
        let mut offset = 0;
        self.fields
            .iter()
            .map(|f| {
                let width = self.width_of(f.kind);
                let entry = (f, offset, width);
                offset += width;
                entry
            })
            .collect()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard(DEFAULT_STRING_WIDTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_order() {
        let registry = SchemaRegistry::default();
        let names = registry.ordered_field_names();
        assert_eq!(names.len(), 13);
        assert_eq!(names[0], "Measurement description");
        assert_eq!(names[4], "Reference");
        assert_eq!(names[12], "Firmware version");
    }

    #[test]
    fn test_record_size() {
        let registry = SchemaRegistry::standard(50);
        // 5 strings * 50 + u32 + bool + 3 * u16 + 2 * f32 + u96
        assert_eq!(registry.record_size(), 250 + 4 + 1 + 6 + 8 + 12);
    }

    #[test]
    fn test_transport_field_replaces_kind_in_place() {
        let registry = SchemaRegistry::new(
            SchemaRegistry::base_fields(),
            vec![
                FieldSpec::new("Measurement UID", FieldKind::U96),
                FieldSpec::new("Reference", FieldKind::Bool),
            ],
            50,
        );
        assert_eq!(registry.field_kind("Measurement UID"), Some(FieldKind::U96));
        assert_eq!(registry.ordered_field_names()[1], "Measurement UID");
        assert_eq!(registry.fields().len(), 5);
    }

    #[test]
    fn test_widen_only_grows() {
        let mut registry = SchemaRegistry::standard(50);
        assert!(registry.widen_strings(64));
        assert_eq!(registry.string_width(), 64);
        assert!(!registry.widen_strings(32));
        assert_eq!(registry.string_width(), 64);
        assert_eq!(registry.width_of(FieldKind::U16), 2);
    }

    #[test]
    fn test_exact_width_copy_can_be_narrower() {
        let registry = SchemaRegistry::standard(50);
        let narrow = registry.with_string_width(32);
        assert_eq!(narrow.string_width(), 32);
        assert_eq!(narrow.fields(), registry.fields());
        assert_eq!(registry.record_size() - narrow.record_size(), 5 * 18);
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let registry = SchemaRegistry::standard(10);
        let offsets = registry.field_offsets();
        assert_eq!(offsets[0].1, 0);
        assert_eq!(offsets[1].1, 10);
        assert_eq!(offsets[2].1, 14);
        let (last, offset, width) = offsets[offsets.len() - 1];
        assert_eq!(last.name, "Firmware version");
        assert_eq!(offset + width, registry.record_size());
    }

    #[test]
    fn test_tag_round_trip() {
        for tag in 0..6u8 {
            let kind = FieldKind::from_tag(tag).unwrap();
            assert_eq!(kind.tag(), tag);
        }
        assert!(FieldKind::from_tag(6).is_none());
    }
}
