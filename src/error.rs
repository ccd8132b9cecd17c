// ⚠️ Error Types - Everything that can stop a reconciliation cycle
//
// The core (deduplication, merge) only ever raises InputSchema.
// Everything else comes from the file glue around it.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// Column mappings missing or inconsistent with the declared column set.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A record or source table lacks a field the core needs.
    #[error("input schema error: {0}")]
    InputSchema(String),

    /// No source file matched the ingestion filter.
    #[error("no source files containing '{keyword}' found in {dir}")]
    NoInput { keyword: String, dir: PathBuf },

    /// Ledger cell that cannot be mapped back onto a record field.
    #[error("ledger format error at row {row}: {message}")]
    LedgerFormat { row: usize, message: String },

    /// Another cycle holds the lock on this ledger.
    #[error("ledger is locked by another run: {0}")]
    LedgerLocked(PathBuf),

    /// Password-protected workbook; an unprotected copy has to be saved first.
    #[error("{0} is password protected; save an unprotected copy before importing")]
    EncryptedSource(PathBuf),

    #[error("spreadsheet error in {path}: {message}")]
    Spreadsheet { path: PathBuf, message: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("journal error: {0}")]
    Journal(#[from] rusqlite::Error),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReconError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReconError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn spreadsheet(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ReconError::Spreadsheet {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
