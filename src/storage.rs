// 💾 Ledger Store - Map the ledger file onto Records and back
//
// Column names for the four roles come from configuration; every other
// column is a passthrough attribute. Writes go to a sibling file first and
// are renamed into place, so a failed write leaves the old ledger intact.

use crate::config::{BackupMode, ColumnRoles, Config};
use crate::error::{ReconError, Result};
use crate::record::{Ledger, Record};
use crate::table::{Table, TableFormat};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// LEDGER STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    sheet: String,
    columns: Vec<String>,
    roles: ColumnRoles,
    backup_mode: BackupMode,
}

impl LedgerStore {
    pub fn new(config: &Config, base_dir: &Path) -> Self {
        LedgerStore {
            path: config.ledger.resolve_path(base_dir),
            sheet: config.ledger.sheet.clone(),
            columns: config.ledger.columns.clone(),
            roles: config.ledger.roles.clone(),
            backup_mode: config.ledger.backup,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the ledger; an absent file is an empty ledger (first run)
    pub fn load(&self) -> Result<Ledger> {
        if !self.exists() {
            info!(path = %self.path.display(), "ledger file not found, starting empty");
            return Ok(Ledger::new());
        }

        let table = Table::read(&self.path, Some(&self.sheet))?;
        let ledger = table_to_ledger(&table, &self.roles)?;
        debug!(rows = ledger.len(), "loaded ledger");
        Ok(ledger)
    }

    /// Write the ledger through a sibling file renamed into place
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let format = self.format()?;
        let table = ledger_to_table(ledger, &self.columns, &self.roles);
        let partial = self.partial_path();

        let written = table
            .write_as(&partial, format, &self.sheet)
            .and_then(|()| {
                fs::rename(&partial, &self.path).map_err(|e| ReconError::io(&self.path, e))
            });
        if let Err(e) = written {
            if partial.exists() {
                if let Err(cleanup) = fs::remove_file(&partial) {
                    warn!(path = %partial.display(), error = %cleanup, "failed to remove partial ledger");
                }
            }
            return Err(e);
        }

        info!(path = %self.path.display(), rows = ledger.len(), "ledger written");
        Ok(())
    }

    /// Create a schema-only ledger. Returns false when the file already exists.
    pub fn init(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }
        self.save(&Ledger::new())?;
        Ok(true)
    }

    /// Copy the current ledger file to its backup path
    pub fn backup(&self, now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        if !self.exists() {
            return Ok(None);
        }
        let target = backup_path(&self.path, self.backup_mode, now.timestamp());
        fs::copy(&self.path, &target).map_err(|e| ReconError::io(&target, e))?;
        info!(backup = %target.display(), "ledger backed up");
        Ok(Some(target))
    }

    /// Prefix shared by every backup of this ledger
    pub fn backup_prefix(&self) -> String {
        format!("{}_bak", file_stem(&self.path))
    }

    fn format(&self) -> Result<TableFormat> {
        TableFormat::from_path(&self.path)
            .ok_or_else(|| ReconError::spreadsheet(&self.path, "unsupported ledger extension"))
    }

    fn partial_path(&self) -> PathBuf {
        let name = match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.partial.{}", file_stem(&self.path), ext),
            None => format!("{}.partial", file_stem(&self.path)),
        };
        self.path.with_file_name(name)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<stem>_bak<.ext>` or `<stem>_bak-<epoch><.ext>`
pub fn backup_path(path: &Path, mode: BackupMode, epoch: i64) -> PathBuf {
    let stem = file_stem(path);
    let suffix = match mode {
        BackupMode::Fixed => "_bak".to_string(),
        BackupMode::Timestamped => format!("_bak-{}", epoch),
    };
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

// ============================================================================
// TABLE ⇄ LEDGER
// ============================================================================

/// Parse a count cell. Spreadsheet tools render integers as "3.0" once a
/// column holds blanks, so whole floats are accepted.
pub fn parse_count(value: &str) -> std::result::Result<Option<u64>, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Ok(n) = value.parse::<u64>() {
        return Ok(Some(n));
    }
    match value.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 && f.is_finite() => Ok(Some(f as u64)),
        _ => Err(format!("invalid count '{}'", value)),
    }
}

fn optional(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn table_to_ledger(table: &Table, roles: &ColumnRoles) -> Result<Ledger> {
    if table.headers.is_empty() && table.rows.is_empty() {
        return Ok(Ledger::new());
    }

    let required = |name: &str| {
        table.column_index(name).ok_or_else(|| ReconError::LedgerFormat {
            row: 1,
            message: format!("missing column '{}'", name),
        })
    };
    let id_idx = required(&roles.identifier)?;
    let first_idx = required(&roles.first_seen)?;
    let last_idx = table.column_index(&roles.last_seen);
    let count_idx = table.column_index(&roles.count);

    let mut ledger = Ledger::new();
    for (i, row) in table.rows.iter().enumerate() {
        // Header is row 1
        let row_number = i + 2;

        let identifier = table.cell(row, id_idx).trim();
        if identifier.is_empty() {
            return Err(ReconError::LedgerFormat {
                row: row_number,
                message: "empty identifier".into(),
            });
        }
        if ledger.contains(identifier) {
            return Err(ReconError::LedgerFormat {
                row: row_number,
                message: format!("duplicate identifier '{}'", identifier),
            });
        }

        let mut record = Record::new(identifier, table.cell(row, first_idx));
        record.last_seen = last_idx.and_then(|idx| optional(table.cell(row, idx)));
        record.count = match count_idx {
            Some(idx) => parse_count(table.cell(row, idx)).map_err(|message| {
                ReconError::LedgerFormat {
                    row: row_number,
                    message,
                }
            })?,
            None => None,
        };

        for (col, header) in table.headers.iter().enumerate() {
            if roles.is_role(header) {
                continue;
            }
            let value = table.cell(row, col);
            if !value.is_empty() {
                record.attributes.insert(header.clone(), value.to_string());
            }
        }

        ledger.insert(record);
    }

    Ok(ledger)
}

/// Configured columns first, then unknown attribute columns in sorted order
pub fn ledger_to_table(ledger: &Ledger, columns: &[String], roles: &ColumnRoles) -> Table {
    let declared: BTreeSet<&str> = columns.iter().map(String::as_str).collect();
    let extra: BTreeSet<&str> = ledger
        .iter()
        .flat_map(|r| r.attributes.keys().map(String::as_str))
        .filter(|k| !declared.contains(k) && !roles.is_role(k))
        .collect();

    let mut headers: Vec<String> = columns.to_vec();
    headers.extend(extra.into_iter().map(str::to_string));

    let mut table = Table::new(headers.clone());
    for record in ledger {
        let row = headers
            .iter()
            .map(|header| {
                if *header == roles.identifier {
                    record.identifier.clone()
                } else if *header == roles.first_seen {
                    record.first_seen.clone()
                } else if *header == roles.last_seen {
                    record.last_seen.clone().unwrap_or_default()
                } else if *header == roles.count {
                    record.count.map(|c| c.to_string()).unwrap_or_default()
                } else {
                    record.attribute(header).unwrap_or("").to_string()
                }
            })
            .collect();
        table.push_row(row);
    }

    table
}

// ============================================================================
// TESTS
// ============================================================================
