//! Class Label Table

use serde::{Deserialize, Serialize};

/// Label reported for anomalous or low-confidence measurements
pub const UNKNOWN_LABEL: &str = "unknown";

/// Closed set of class labels; index 0 is always the unknown label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct LabelTable {
    labels: Vec<String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::new(["5_CTS", "10_CTS", "20_CTS", "50_CTS", "1_CHF", "2_CHF", "5_CHF"])
    }
}

impl From<Vec<String>> for LabelTable {
    fn from(labels: Vec<String>) -> Self {
        Self::new(labels)
    }
}

impl From<LabelTable> for Vec<String> {
    fn from(table: LabelTable) -> Self {
        table.labels
    }
}

impl LabelTable {
    /// Table with `unknown` followed by the given coin labels
    pub fn new<I, S>(coins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = std::iter::once(UNKNOWN_LABEL.to_string())
            .chain(coins.into_iter().map(Into::into).filter(|l| l != UNKNOWN_LABEL))
            .collect();
        Self { labels }
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn unknown(&self) -> &str {
        UNKNOWN_LABEL
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = LabelTable::default();
        assert_eq!(table.len(), 8);
        assert_eq!(table.name(0), Some(UNKNOWN_LABEL));
        assert_eq!(table.name(4), Some("50_CTS"));
        assert_eq!(table.index_of("5_CHF"), Some(7));
        assert_eq!(table.name(8), None);
    }

    #[test]
    fn test_unknown_stays_first() {
        let table = LabelTable::new(["a", "unknown", "b"]);
        assert_eq!(table.iter().collect::<Vec<_>>(), vec!["unknown", "a", "b"]);
    }
}
