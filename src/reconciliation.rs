// ⚖️ Reconciliation Engine - One cycle: deduplicate, then merge
//
//   ledger empty  → ledger' = deduplicate(ledger ∪ batch)     (first run)
//   otherwise     → ledger' = merge(ledger, deduplicate(batch))
//
// Pure over its inputs: nothing is kept between calls, and an error means
// no ledger comes back at all.

use crate::deduplication::{summarize, BatchDeduplicator};
use crate::error::Result;
use crate::merge::{LedgerMerger, MergeOutcome};
use crate::policy::MergePolicy;
use crate::record::{Batch, Ledger};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// RECONCILIATION MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationMode {
    /// Ledger was empty; the deduplicated batch became the ledger
    FirstRun,

    /// Batch was merged into an existing ledger
    Incremental,
}

impl ReconciliationMode {
    pub fn name(&self) -> &str {
        match self {
            ReconciliationMode::FirstRun => "first_run",
            ReconciliationMode::Incremental => "incremental",
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub mode: ReconciliationMode,
    pub raw_records: usize,
    pub distinct_identifiers: usize,
    pub repeated_identifiers: usize,
    pub known: usize,
    pub inserted: usize,
    pub ledger_before: usize,
    pub ledger_after: usize,
    pub observations_before: u64,
    pub observations_after: u64,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} raw rows, {} identifiers ({} repeated), {} known, {} new, ledger {} → {}",
            self.mode.name(),
            self.raw_records,
            self.distinct_identifiers,
            self.repeated_identifiers,
            self.known,
            self.inserted,
            self.ledger_before,
            self.ledger_after
        )
    }
}

/// Result of one reconciliation call
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub ledger: Ledger,
    pub report: ReconciliationReport,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    pub policy: MergePolicy,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: MergePolicy) -> Self {
        ReconciliationEngine { policy }
    }

    /// Reconcile one batch against the ledger.
    ///
    /// Example:
    /// ```
    /// use ledger_recon::{Ledger, Record, ReconciliationEngine, ReconciliationMode};
    ///
    /// let engine = ReconciliationEngine::new();
    /// let batch = vec![
    ///     Record::new("A", "2024-01-01"),
    ///     Record::new("A", "2024-01-02"),
    /// ];
    ///
    /// let result = engine.reconcile(Ledger::new(), batch).unwrap();
    /// assert_eq!(result.report.mode, ReconciliationMode::FirstRun);
    /// assert_eq!(result.ledger.get("A").unwrap().count, Some(2));
    /// ```
    pub fn reconcile(&self, ledger: Ledger, batch: Batch) -> Result<Reconciliation> {
        let summary = summarize(&batch);
        let ledger_before = ledger.len();
        let observations_before = ledger.total_count();
        let deduplicator = BatchDeduplicator::with_policy(&self.policy);

        let (mode, ledger, outcome) = if ledger.is_empty() {
            // Self-deduplication over the union; an empty ledger has no
            // count or last_seen to carry forward
            let combined: Batch = ledger.into_records().into_iter().chain(batch).collect();
            let ledger = deduplicator.deduplicate(combined)?;
            let outcome = MergeOutcome {
                known: 0,
                inserted: ledger.len(),
            };
            (ReconciliationMode::FirstRun, ledger, outcome)
        } else {
            let deduped = deduplicator.deduplicate(batch)?;
            let merger = LedgerMerger::with_policy(&self.policy);
            let (ledger, outcome) = merger.merge_with_outcome(ledger, deduped);
            (ReconciliationMode::Incremental, ledger, outcome)
        };

        debug!(
            mode = mode.name(),
            known = outcome.known,
            inserted = outcome.inserted,
            "reconciled batch"
        );

        let report = ReconciliationReport {
            mode,
            raw_records: summary.raw_records,
            distinct_identifiers: summary.distinct_identifiers,
            repeated_identifiers: summary.repeated_identifiers,
            known: outcome.known,
            inserted: outcome.inserted,
            ledger_before,
            ledger_after: ledger.len(),
            observations_before,
            observations_after: ledger.total_count(),
            reconciled_at: Utc::now(),
        };

        Ok(Reconciliation { ledger, report })
    }
}

/// Reconcile with the reference policy
pub fn reconcile(ledger: Ledger, batch: Batch) -> Result<Ledger> {
    ReconciliationEngine::new()
        .reconcile(ledger, batch)
        .map(|r| r.ledger)
}

// ============================================================================
// TESTS
// ============================================================================
