// 📇 Record & Ledger - The data model every stage shares
//
// A Record is one observation of an entity. A Ledger is the keyed,
// insertion-ordered collection of Records with unique identifiers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// RECORD
// ============================================================================

/// One observation of an entity.
///
/// The four role fields are typed; everything else the source carried rides
/// along in `attributes` and is never inspected by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Deduplication key, unique within a ledger
    pub identifier: String,

    /// Earliest observation time (lexicographically comparable)
    pub first_seen: String,

    /// Most recent observation time (None = empty cell)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,

    /// Number of raw observations collapsed into this record (None = empty cell)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    /// Passthrough columns, keyed by their external column name
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl Record {
    pub fn new(identifier: impl Into<String>, first_seen: impl Into<String>) -> Self {
        Record {
            identifier: identifier.into(),
            first_seen: first_seen.into(),
            last_seen: None,
            count: None,
            attributes: HashMap::new(),
        }
    }

    /// Builder pattern: set last-seen time
    pub fn with_last_seen(mut self, last_seen: impl Into<String>) -> Self {
        self.last_seen = Some(last_seen.into());
        self
    }

    /// Builder pattern: set count
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Builder pattern: add a passthrough attribute
    pub fn with_attribute(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }

    /// Count with an empty cell read as zero
    pub fn count_or_zero(&self) -> u64 {
        self.count.unwrap_or(0)
    }

    pub fn attribute(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).map(String::as_str)
    }
}

/// One import cycle's raw records; identifiers may repeat.
pub type Batch = Vec<Record>;

// ============================================================================
// LEDGER
// ============================================================================

/// Records keyed by identifier, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<&Record> {
        self.index.get(identifier).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, identifier: &str) -> Option<&mut Record> {
        match self.index.get(identifier) {
            Some(&i) => Some(&mut self.records[i]),
            None => None,
        }
    }

    /// Insert a record. An existing entry with the same identifier is
    /// replaced in place and returned; otherwise the record is appended.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        match self.index.get(&record.identifier) {
            Some(&i) => Some(std::mem::replace(&mut self.records[i], record)),
            None => {
                self.index.insert(record.identifier.clone(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.identifier.as_str())
    }

    /// Sum of all counts, empty cells read as zero
    pub fn total_count(&self) -> u64 {
        self.records.iter().map(Record::count_or_zero).sum()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl FromIterator<Record> for Ledger {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut ledger = Ledger::new();
        for record in iter {
            ledger.insert(record);
        }
        ledger
    }
}

impl IntoIterator for Ledger {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_appends_in_order() {
        let mut ledger = Ledger::new();
        ledger.insert(Record::new("B", "2024-01-02"));
        ledger.insert(Record::new("A", "2024-01-01"));

        let ids: Vec<&str> = ledger.identifiers().collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut ledger: Ledger = vec![
            Record::new("A", "2024-01-01").with_count(1),
            Record::new("B", "2024-01-01").with_count(1),
        ]
        .into_iter()
        .collect();

        let old = ledger.insert(Record::new("A", "2024-01-01").with_count(5));

        assert_eq!(old.and_then(|r| r.count), Some(1));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.identifiers().next(), Some("A"));
        assert_eq!(ledger.get("A").and_then(|r| r.count), Some(5));
    }

    #[test]
    fn test_total_count_treats_empty_as_zero() {
        let ledger: Ledger = vec![
            Record::new("A", "2024-01-01").with_count(2),
            Record::new("B", "2024-01-01"),
        ]
        .into_iter()
        .collect();

        assert_eq!(ledger.total_count(), 2);
    }

    #[test]
    fn test_get_mut_updates_record() {
        let mut ledger: Ledger = vec![Record::new("A", "2024-01-01")].into_iter().collect();

        if let Some(record) = ledger.get_mut("A") {
            record.last_seen = Some("2024-03-01".to_string());
        }

        assert_eq!(
            ledger.get("A").and_then(|r| r.last_seen.as_deref()),
            Some("2024-03-01")
        );
        assert!(ledger.get_mut("missing").is_none());
    }
}
