// 🔗 Ledger Merger - Fold a deduplicated batch into the ledger
//
// Known identifiers: counts add, last_seen is taken from the batch
// (empty included, unless the policy says otherwise).
// New identifiers: appended verbatim after the existing rows.

use crate::policy::{LastSeenUpdate, MergePolicy};
use crate::record::{Ledger, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Batch identifiers already present in the ledger
    pub known: usize,

    /// Batch identifiers appended as new entries
    pub inserted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerMerger {
    pub last_seen_update: LastSeenUpdate,
}

impl LedgerMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: &MergePolicy) -> Self {
        LedgerMerger {
            last_seen_update: policy.last_seen_update,
        }
    }

    /// Merge `batch` (already deduplicated) into `ledger`.
    pub fn merge(&self, ledger: Ledger, batch: Ledger) -> Ledger {
        self.merge_with_outcome(ledger, batch).0
    }

    pub fn merge_with_outcome(&self, ledger: Ledger, batch: Ledger) -> (Ledger, MergeOutcome) {
        let mut ledger = ledger;
        let mut outcome = MergeOutcome::default();

        for incoming in batch {
            match ledger.get_mut(&incoming.identifier) {
                Some(existing) => {
                    self.fold_known(existing, incoming);
                    outcome.known += 1;
                }
                None => {
                    ledger.insert(incoming);
                    outcome.inserted += 1;
                }
            }
        }

        (ledger, outcome)
    }

    fn fold_known(&self, existing: &mut Record, incoming: Record) {
        existing.count = match (existing.count, incoming.count) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
        };

        match self.last_seen_update {
            LastSeenUpdate::Overwrite => existing.last_seen = incoming.last_seen,
            LastSeenUpdate::SkipEmpty => {
                if incoming.last_seen.is_some() {
                    existing.last_seen = incoming.last_seen;
                }
            }
            LastSeenUpdate::Latest => {
                if let Some(last_seen) = incoming.last_seen {
                    let newer = existing
                        .last_seen
                        .as_ref()
                        .map_or(true, |current| last_seen > *current);
                    if newer {
                        existing.last_seen = Some(last_seen);
                    }
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
