// ⚙️ Configuration - Column roles, sources, backup and policy
//
// Read once from TOML, validated, then passed by reference everywhere.

use crate::error::{ReconError, Result};
use crate::policy::MergePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub policy: MergePolicy,
    #[serde(default)]
    pub journal: Option<JournalConfig>,
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Ledger file (.csv or .xlsx), relative to the run directory
    pub path: PathBuf,

    /// Worksheet name when the ledger is a workbook
    #[serde(default = "default_sheet")]
    pub sheet: String,

    /// Full, ordered set of ledger columns
    pub columns: Vec<String>,

    #[serde(flatten)]
    pub roles: ColumnRoles,

    #[serde(default)]
    pub backup: BackupMode,
}

fn default_sheet() -> String {
    "Sheet1".to_string()
}

impl LedgerConfig {
    pub fn resolve_path(&self, base: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            base.join(&self.path)
        }
    }
}

/// External column names for the four record roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoles {
    pub identifier: String,
    pub first_seen: String,
    pub last_seen: String,
    pub count: String,
}

impl ColumnRoles {
    pub fn names(&self) -> [&str; 4] {
        [
            self.identifier.as_str(),
            self.first_seen.as_str(),
            self.last_seen.as_str(),
            self.count.as_str(),
        ]
    }

    pub fn is_role(&self, column: &str) -> bool {
        self.names().contains(&column)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupMode {
    /// `<stem>_bak<.ext>`, overwritten every run
    #[default]
    Fixed,

    /// `<stem>_bak-<epoch><.ext>`, one per run
    Timestamped,
}

// ============================================================================
// SOURCE
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Import files are those whose name contains this text
    pub filename_contains: String,

    /// Worksheet to read from workbooks (default: first sheet)
    #[serde(default)]
    pub sheet: Option<String>,

    /// Source timestamp column, renamed to the first-seen column on import
    #[serde(default)]
    pub timestamp_column: Option<String>,

    #[serde(default)]
    pub filter_column: Option<String>,

    #[serde(default)]
    pub filter_value: Option<String>,
}

impl SourceConfig {
    /// Row filter as (column, value) when configured
    pub fn filter(&self) -> Option<(&str, &str)> {
        match (&self.filter_column, &self.filter_value) {
            (Some(column), Some(value)) => Some((column.as_str(), value.as_str())),
            _ => None,
        }
    }

    /// Column the source timestamp is read from
    pub fn timestamp_column<'a>(&'a self, roles: &'a ColumnRoles) -> &'a str {
        self.timestamp_column
            .as_deref()
            .unwrap_or(roles.first_seen.as_str())
    }
}

// ============================================================================
// JOURNAL
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// SQLite database recording every cycle
    pub path: PathBuf,
}

impl JournalConfig {
    pub fn resolve_path(&self, base: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            base.join(&self.path)
        }
    }
}

// ============================================================================
// PARSE + VALIDATE
// ============================================================================

impl Config {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(input).map_err(|e| ReconError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ReconError::io(path, e))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let roles = &self.ledger.roles;

        for (role, name) in ["identifier", "first_seen", "last_seen", "count"]
            .iter()
            .zip(roles.names())
        {
            if name.trim().is_empty() {
                return Err(ReconError::Configuration(format!(
                    "ledger.{} column name is empty",
                    role
                )));
            }
        }

        let ext = self
            .ledger
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        if !matches!(ext.as_deref(), Some("csv") | Some("xlsx")) {
            return Err(ReconError::Configuration(format!(
                "ledger.path must be a .csv or .xlsx file: {}",
                self.ledger.path.display()
            )));
        }

        let distinct: HashSet<&str> = roles.names().into_iter().collect();
        if distinct.len() != 4 {
            return Err(ReconError::Configuration(
                "identifier, first_seen, last_seen and count must name different columns".into(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &self.ledger.columns {
            if !seen.insert(column.as_str()) {
                return Err(ReconError::Configuration(format!(
                    "ledger.columns lists '{}' twice",
                    column
                )));
            }
        }

        for name in roles.names() {
            if !seen.contains(name) {
                return Err(ReconError::Configuration(format!(
                    "role column '{}' is not declared in ledger.columns",
                    name
                )));
            }
        }

        if self.source.filename_contains.trim().is_empty() {
            return Err(ReconError::Configuration(
                "source.filename_contains must not be empty".into(),
            ));
        }

        if self.source.filter_column.is_some() != self.source.filter_value.is_some() {
            return Err(ReconError::Configuration(
                "source.filter_column and source.filter_value must be set together".into(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
