// 🔄 Run Cycle - lock → load → ingest → reconcile → backup → write → journal
//
// This is the only place that touches the filesystem in sequence. The
// ledger file is not modified until reconciliation has fully succeeded and
// every output (backup, journal) is known to be writable.

use crate::config::Config;
use crate::error::ReconError;
use crate::journal::{RunEntry, RunJournal};
use crate::lock::LedgerLock;
use crate::reconciliation::{ReconciliationEngine, ReconciliationMode, ReconciliationReport};
use crate::source::{SourceReader, SourceScanner, SourceStat};
use crate::storage::LedgerStore;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Directory holding the source exports; relative ledger/journal paths
    /// resolve against it too
    pub dir: PathBuf,

    /// Reconcile and report without writing anything
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub report: ReconciliationReport,
    pub sources: Vec<SourceStat>,
    pub ledger_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub dry_run: bool,
    pub elapsed_ms: i64,
}

pub fn run_cycle(config: &Config, options: &CycleOptions) -> Result<CycleOutcome> {
    let started_at = Utc::now();
    let store = LedgerStore::new(config, &options.dir);

    let _lock = LedgerLock::acquire(store.path())
        .with_context(|| format!("Failed to lock ledger {}", store.path().display()))?;

    let ledger = store
        .load()
        .with_context(|| format!("Failed to read ledger {}", store.path().display()))?;
    let first_run = ledger.is_empty();

    let files = SourceScanner::new(config.source.filename_contains.clone())
        .exclude_file(store.path())
        .exclude_prefix(store.backup_prefix())
        .scan(&options.dir)?;
    if files.is_empty() {
        return Err(ReconError::NoInput {
            keyword: config.source.filename_contains.clone(),
            dir: options.dir.clone(),
        }
        .into());
    }

    let ingested = SourceReader::new(config)
        .ingest(&files)
        .context("Failed to ingest source files")?;
    let mut batch = ingested.batch;

    if !first_run {
        // Raw rows carry no count or last-seen into a merge
        for record in &mut batch {
            record.last_seen = None;
            record.count = None;
        }
    }

    let engine = ReconciliationEngine::with_policy(config.policy);
    let reconciliation = engine.reconcile(ledger, batch)?;
    info!(summary = %reconciliation.report.summary(), "reconciliation complete");

    let mut backup = None;
    let mut run_id = None;
    if !options.dry_run {
        // Journal must be reachable before the ledger is touched
        let journal = match &config.journal {
            Some(journal) => {
                let path = journal.resolve_path(&options.dir);
                let opened = RunJournal::open(&path)
                    .with_context(|| format!("Failed to open run journal {}", path.display()))?;
                Some((opened, path))
            }
            None => None,
        };

        if reconciliation.report.mode == ReconciliationMode::Incremental {
            backup = store
                .backup(started_at)
                .context("Failed to back up ledger")?;
        }
        store
            .save(&reconciliation.ledger)
            .with_context(|| format!("Failed to write ledger {}", store.path().display()))?;

        // Ledger is committed; journal failures are only logged
        if let Some((journal, path)) = journal {
            let entry = RunEntry::from_report(
                &reconciliation.report,
                started_at,
                ingested.sources.len(),
                backup.as_deref(),
            );
            match journal.record(&entry) {
                Ok(()) => run_id = Some(entry.run_id),
                Err(e) => warn!(
                    journal = %path.display(),
                    error = %e,
                    "ledger written but run was not journaled"
                ),
            }
        }
    }

    Ok(CycleOutcome {
        report: reconciliation.report,
        sources: ingested.sources,
        ledger_path: store.path().to_path_buf(),
        backup,
        run_id,
        dry_run: options.dry_run,
        elapsed_ms: (Utc::now() - started_at).num_milliseconds(),
    })
}

// ============================================================================
// TESTS
// ============================================================================
