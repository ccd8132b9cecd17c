// Ledger Reconciliation - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod record;         // Record, Batch, Ledger
pub mod policy;         // Last-seen merge knobs
pub mod deduplication;  // Batch self-deduplication
pub mod merge;          // Fold a deduplicated batch into the ledger
pub mod reconciliation; // One cycle: deduplicate, then merge
pub mod config;
pub mod table;          // CSV / workbook rows
pub mod storage;        // Ledger file ⇄ Ledger, backups
pub mod source;         // Source discovery and ingestion
pub mod lock;
pub mod journal;        // SQLite run history
pub mod pipeline;       // lock → load → ingest → reconcile → write

// Re-export commonly used types
pub use error::{ReconError, Result};
pub use record::{Batch, Ledger, Record};
pub use policy::{LastSeenUpdate, MergePolicy, SingletonLastSeen};
pub use deduplication::{summarize, BatchDeduplicator, DeduplicationSummary};
pub use merge::{LedgerMerger, MergeOutcome};
pub use reconciliation::{
    reconcile, Reconciliation, ReconciliationEngine, ReconciliationMode, ReconciliationReport,
};
pub use config::{BackupMode, ColumnRoles, Config, JournalConfig, LedgerConfig, SourceConfig};
pub use table::{Table, TableFormat};
pub use storage::LedgerStore;
pub use source::{IngestedBatch, SourceReader, SourceScanner, SourceStat};
pub use lock::LedgerLock;
pub use journal::{RunEntry, RunJournal};
pub use pipeline::{run_cycle, CycleOptions, CycleOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Deduplicate a raw batch with the default policy
pub fn deduplicate(batch: Batch) -> Result<Ledger> {
    BatchDeduplicator::new().deduplicate(batch)
}

/// Merge a deduplicated batch into the ledger with the default policy
pub fn merge(ledger: Ledger, batch: Ledger) -> Ledger {
    LedgerMerger::new().merge(ledger, batch)
}
