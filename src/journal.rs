// 📜 Run Journal - Audit trail of reconciliation cycles (SQLite + WAL)
//
// Every cycle that writes a ledger appends one row. Nothing here feeds back
// into reconciliation; it exists so an operator can see what each run did.

use crate::error::Result;
use crate::reconciliation::ReconciliationReport;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

// ============================================================================
// RUN ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub mode: String,
    pub sources: usize,
    pub raw_records: usize,
    pub distinct_identifiers: usize,
    pub known: usize,
    pub inserted: usize,
    pub ledger_before: usize,
    pub ledger_after: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
}

impl RunEntry {
    pub fn from_report(
        report: &ReconciliationReport,
        started_at: DateTime<Utc>,
        sources: usize,
        backup: Option<&Path>,
    ) -> Self {
        RunEntry {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            mode: report.mode.name().to_string(),
            sources,
            raw_records: report.raw_records,
            distinct_identifiers: report.distinct_identifiers,
            known: report.known,
            inserted: report.inserted,
            ledger_before: report.ledger_before,
            ledger_after: report.ledger_after,
            backup: backup.map(|p| p.display().to_string()),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} [{}] {} sources, {} rows, +{} new, {} known, ledger {} → {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.run_id.chars().take(8).collect::<String>(),
            self.mode,
            self.sources,
            self.raw_records,
            self.inserted,
            self.known,
            self.ledger_before,
            self.ledger_after
        )
    }
}

// ============================================================================
// RUN JOURNAL
// ============================================================================

pub struct RunJournal {
    conn: Connection,
}

impl RunJournal {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        setup_journal(&conn)?;
        Ok(RunJournal { conn })
    }

    pub fn record(&self, entry: &RunEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO runs (
                run_id, started_at, mode, sources, raw_records, distinct_identifiers,
                known, inserted, ledger_before, ledger_after, backup
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.run_id,
                entry.started_at.to_rfc3339(),
                entry.mode,
                entry.sources as i64,
                entry.raw_records as i64,
                entry.distinct_identifiers as i64,
                entry.known as i64,
                entry.inserted as i64,
                entry.ledger_before as i64,
                entry.ledger_after as i64,
                entry.backup,
            ],
        )?;
        debug!(run_id = %entry.run_id, "run journaled");
        Ok(())
    }

    /// Most recent runs first
    pub fn recent(&self, limit: usize) -> Result<Vec<RunEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, started_at, mode, sources, raw_records, distinct_identifiers,
                    known, inserted, ledger_before, ledger_after, backup
             FROM runs
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let started_at: String = row.get(1)?;
            let started_at = DateTime::parse_from_rfc3339(&started_at)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?
                .with_timezone(&Utc);

            Ok(RunEntry {
                run_id: row.get(0)?,
                started_at,
                mode: row.get(2)?,
                sources: row.get::<_, i64>(3)? as usize,
                raw_records: row.get::<_, i64>(4)? as usize,
                distinct_identifiers: row.get::<_, i64>(5)? as usize,
                known: row.get::<_, i64>(6)? as usize,
                inserted: row.get::<_, i64>(7)? as usize,
                ledger_before: row.get::<_, i64>(8)? as usize,
                ledger_after: row.get::<_, i64>(9)? as usize,
                backup: row.get(10)?,
            })
        })?;

        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }
}

fn setup_journal(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            started_at TEXT NOT NULL,
            mode TEXT NOT NULL,
            sources INTEGER NOT NULL,
            raw_records INTEGER NOT NULL,
            distinct_identifiers INTEGER NOT NULL,
            known INTEGER NOT NULL,
            inserted INTEGER NOT NULL,
            ledger_before INTEGER NOT NULL,
            ledger_after INTEGER NOT NULL,
            backup TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Ledger, Record};
    use crate::reconciliation::ReconciliationEngine;
    use tempfile::tempdir;

    fn sample_report() -> ReconciliationReport {
        let batch = vec![
            Record::new("A", "2024-01-01"),
            Record::new("A", "2024-01-02"),
            Record::new("B", "2024-01-01"),
        ];
        ReconciliationEngine::new()
            .reconcile(Ledger::new(), batch)
            .unwrap()
            .report
    }

    #[test]
    fn test_record_and_read_back() {
        let dir = tempdir().unwrap();
        let journal = RunJournal::open(&dir.path().join("runs.db")).unwrap();
        let report = sample_report();

        let first = RunEntry::from_report(&report, Utc::now(), 1, None);
        let second = RunEntry::from_report(
            &report,
            Utc::now(),
            2,
            Some(Path::new("ledger_bak.xlsx")),
        );
        journal.record(&first).unwrap();
        journal.record(&second).unwrap();

        let entries = journal.recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].run_id, second.run_id);
        assert_eq!(entries[0].backup.as_deref(), Some("ledger_bak.xlsx"));
        assert_eq!(entries[1].mode, "first_run");
        assert_eq!(entries[1].raw_records, 3);
        assert_eq!(entries[1].inserted, 2);

        assert_eq!(journal.recent(1).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_keeps_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runs.db");
        let entry = RunEntry::from_report(&sample_report(), Utc::now(), 1, None);

        RunJournal::open(&path).unwrap().record(&entry).unwrap();
        let entries = RunJournal::open(&path).unwrap().recent(5).unwrap();

        assert_eq!(entries.len(), 1);
        assert!(entries[0].summary().contains("first_run"));
    }

    #[test]
    fn test_summary_with_non_ascii_run_id() {
        let mut entry = RunEntry::from_report(&sample_report(), Utc::now(), 1, None);
        entry.run_id = "台账运行-二〇二四年一月".to_string();

        let summary = entry.summary();
        assert!(summary.contains(" 台账运行-二〇二 [first_run]"));
        assert!(!summary.contains("四"));
    }
}
