//! Container Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing a measurement container
#[derive(Debug, Error)]
pub enum DataFileError {
    /// Container cannot be opened or its schema is not recognized
    #[error("Unreadable container {}: {reason}", path.display())]
    UnreadableContainer { path: PathBuf, reason: String },

    /// Structural violation while decoding a single record
    #[error("Malformed record{}: {reason}", slot.map(|s| format!(" in slot {}", s)).unwrap_or_default())]
    MalformedRecord { slot: Option<usize>, reason: String },

    /// Logical index does not address an existing measurement
    #[error("Measurement index {index} out of range ({count} measurements)")]
    IndexOutOfRange { index: i64, count: usize },

    /// Every slot of the container is already used
    #[error("Container is full ({capacity} slots)")]
    ContainerFull { capacity: usize },

    /// Value does not fit the schema (writer side)
    #[error("Schema violation for field '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataFileError {
    /// Build a malformed-record error without slot context
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        DataFileError::MalformedRecord {
            slot: None,
            reason: reason.into(),
        }
    }

    /// Attach the physical slot to a malformed-record error
    pub(crate) fn in_slot(self, slot: usize) -> Self {
        match self {
            DataFileError::MalformedRecord { reason, .. } => DataFileError::MalformedRecord {
                slot: Some(slot),
                reason,
            },
            other => other,
        }
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DataFileError::UnreadableContainer {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
