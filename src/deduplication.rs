// 🔍 Deduplication Engine - Collapse one batch to one row per identifier
//
// Sort by first_seen (stable), then walk the batch once:
//   - first occurrence of an identifier becomes the representative
//   - every later occurrence bumps the count and becomes the new last_seen

use crate::error::{ReconError, Result};
use crate::policy::{MergePolicy, SingletonLastSeen};
use crate::record::{Batch, Ledger, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeduplicationSummary {
    /// Rows in the raw batch
    pub raw_records: usize,

    /// Distinct identifiers in the batch
    pub distinct_identifiers: usize,

    /// Identifiers that occur more than once
    pub repeated_identifiers: usize,
}

/// Count rows and repeats without deduplicating
pub fn summarize(batch: &[Record]) -> DeduplicationSummary {
    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for record in batch {
        *occurrences.entry(record.identifier.as_str()).or_insert(0) += 1;
    }

    DeduplicationSummary {
        raw_records: batch.len(),
        distinct_identifiers: occurrences.len(),
        repeated_identifiers: occurrences.values().filter(|&&n| n > 1).count(),
    }
}

// ============================================================================
// BATCH DEDUPLICATOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BatchDeduplicator {
    /// Singleton handling (default: preserve caller's last_seen)
    pub singleton_last_seen: SingletonLastSeen,
}

impl BatchDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: &MergePolicy) -> Self {
        BatchDeduplicator {
            singleton_last_seen: policy.singleton_last_seen,
        }
    }

    /// Collapse a raw batch into one record per identifier.
    ///
    /// Output order is the order identifiers first appear after sorting.
    /// Passthrough attributes come from the earliest occurrence.
    pub fn deduplicate(&self, batch: Batch) -> Result<Ledger> {
        validate_batch(&batch)?;

        let mut batch = batch;
        // sort_by is stable: equal timestamps keep batch order
        batch.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));

        let mut ledger = Ledger::new();
        for record in batch {
            match ledger.get_mut(&record.identifier) {
                Some(representative) => {
                    representative.count = Some(representative.count_or_zero() + 1);
                    representative.last_seen = Some(record.first_seen);
                }
                None => {
                    let mut representative = record;
                    representative.count = Some(1);
                    ledger.insert(representative);
                }
            }
        }

        if self.singleton_last_seen == SingletonLastSeen::Fill {
            let singletons: Vec<String> = ledger
                .iter()
                .filter(|r| r.count == Some(1) && r.last_seen.is_none())
                .map(|r| r.identifier.clone())
                .collect();
            for identifier in singletons {
                if let Some(record) = ledger.get_mut(&identifier) {
                    record.last_seen = Some(record.first_seen.clone());
                }
            }
        }

        Ok(ledger)
    }
}

/// Every record needs a key and a sort timestamp.
fn validate_batch(batch: &[Record]) -> Result<()> {
    for (position, record) in batch.iter().enumerate() {
        if record.identifier.trim().is_empty() {
            return Err(ReconError::InputSchema(format!(
                "batch record {} has no identifier",
                position + 1
            )));
        }
        if record.first_seen.trim().is_empty() {
            return Err(ReconError::InputSchema(format!(
                "batch record {} ({}) has no first-seen time",
                position + 1,
                record.identifier
            )));
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
