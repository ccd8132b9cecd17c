// 📥 Source Ingestion - Find export files and turn them into one raw Batch
//
// Per file: read the table, keep rows matching the filter, read the source
// timestamp column as first_seen, carry every other column through.

use crate::config::{ColumnRoles, Config, SourceConfig};
use crate::error::{ReconError, Result};
use crate::record::{Batch, Record};
use crate::table::{Table, TableFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// DISCOVERY
// ============================================================================

/// Finds import files in one directory.
#[derive(Debug, Clone)]
pub struct SourceScanner {
    keyword: String,
    excluded_files: Vec<PathBuf>,
    excluded_prefixes: Vec<String>,
}

impl SourceScanner {
    pub fn new(keyword: impl Into<String>) -> Self {
        SourceScanner {
            keyword: keyword.into(),
            excluded_files: Vec::new(),
            excluded_prefixes: Vec::new(),
        }
    }

    /// Never pick up this file, even when its name matches
    pub fn exclude_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded_files.push(path.into());
        self
    }

    /// Never pick up files whose name starts with this prefix
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }

    /// Matching files in `dir`, sorted by name
    pub fn scan(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*{}*",
            glob::Pattern::escape(&dir.to_string_lossy()),
            glob::Pattern::escape(&self.keyword)
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| ReconError::Configuration(format!("bad source pattern: {}", e)))?;

        // Compare resolved paths so `./ledger.csv` and `/abs/ledger.csv` agree
        let excluded: Vec<PathBuf> = self.excluded_files.iter().map(|p| resolve(p)).collect();

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                ReconError::io(path, std::io::Error::from(e))
            })?;
            if self.accepts(&path, &excluded) {
                files.push(path);
            }
        }
        files.sort();

        debug!(dir = %dir.display(), found = files.len(), "scanned for sources");
        Ok(files)
    }

    fn accepts(&self, path: &Path, excluded: &[PathBuf]) -> bool {
        if !path.is_file() || TableFormat::from_path(path).is_none() {
            return false;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        // Office lock files
        if name.starts_with("~$") || name.contains(".partial.") {
            return false;
        }
        if self.excluded_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return false;
        }
        let resolved = resolve(path);
        !excluded.iter().any(|p| *p == resolved)
    }
}

/// Canonical path when it exists, the path as given otherwise
fn resolve(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

// ============================================================================
// READING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStat {
    pub path: PathBuf,
    pub rows_read: usize,
    pub rows_kept: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IngestedBatch {
    pub batch: Batch,
    pub sources: Vec<SourceStat>,
}

/// Converts source tables into raw records for the core.
#[derive(Debug, Clone)]
pub struct SourceReader {
    roles: ColumnRoles,
    source: SourceConfig,
}

impl SourceReader {
    pub fn new(config: &Config) -> Self {
        SourceReader {
            roles: config.ledger.roles.clone(),
            source: config.source.clone(),
        }
    }

    /// Read every file in order and concatenate the kept rows
    pub fn ingest(&self, files: &[PathBuf]) -> Result<IngestedBatch> {
        let mut ingested = IngestedBatch::default();
        for path in files {
            let (records, stat) = self.read_file(path)?;
            info!(
                source = %path.display(),
                read = stat.rows_read,
                kept = stat.rows_kept,
                "source ingested"
            );
            ingested.batch.extend(records);
            ingested.sources.push(stat);
        }
        Ok(ingested)
    }

    pub fn read_file(&self, path: &Path) -> Result<(Batch, SourceStat)> {
        let table = Table::read(path, self.source.sheet.as_deref())?;
        let records = self.table_to_batch(&table, path)?;
        let stat = SourceStat {
            path: path.to_path_buf(),
            rows_read: table.rows.len(),
            rows_kept: records.len(),
        };
        Ok((records, stat))
    }

    /// Filter rows and map columns onto record roles
    pub fn table_to_batch(&self, table: &Table, origin: &Path) -> Result<Batch> {
        let require = |name: &str| {
            table.column_index(name).ok_or_else(|| {
                ReconError::InputSchema(format!(
                    "{} has no column '{}'",
                    origin.display(),
                    name
                ))
            })
        };

        let id_idx = require(&self.roles.identifier)?;
        let time_column = self.source.timestamp_column(&self.roles);
        let time_idx = require(time_column)?;
        let filter = match self.source.filter() {
            Some((column, value)) => Some((require(column)?, value)),
            None => None,
        };
        let last_idx = table
            .column_index(&self.roles.last_seen)
            .filter(|&idx| idx != time_idx);

        let mut batch = Vec::new();
        for (i, row) in table.rows.iter().enumerate() {
            if let Some((column, value)) = filter {
                if table.cell(row, column).trim() != value {
                    continue;
                }
            }

            let row_number = i + 2;
            let identifier = table.cell(row, id_idx).trim();
            let first_seen = table.cell(row, time_idx).trim();
            if identifier.is_empty() || first_seen.is_empty() {
                return Err(ReconError::InputSchema(format!(
                    "{} row {}: missing {}",
                    origin.display(),
                    row_number,
                    if identifier.is_empty() { "identifier" } else { "timestamp" }
                )));
            }

            let mut record = Record::new(identifier, first_seen);
            if let Some(idx) = last_idx {
                let value = table.cell(row, idx).trim();
                if !value.is_empty() {
                    record.last_seen = Some(value.to_string());
                }
            }

            for (col, header) in table.headers.iter().enumerate() {
                if col == id_idx || col == time_idx || Some(col) == last_idx {
                    continue;
                }
                // Raw counts are recomputed by the deduplicator
                if *header == self.roles.count || *header == self.roles.first_seen {
                    continue;
                }
                let value = table.cell(row, col);
                if !value.is_empty() {
                    record.attributes.insert(header.clone(), value.to_string());
                }
            }

            batch.push(record);
        }

        Ok(batch)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CONFIG: &str = r#"
[ledger]
path = "ledger.csv"
columns = ["phone", "first_seen", "last_seen", "count", "province"]
identifier = "phone"
first_seen = "first_seen"
last_seen = "last_seen"
count = "count"

[source]
filename_contains = "export"
timestamp_column = "received_at"
filter_column = "province"
filter_value = "North"
"#;

    fn test_config() -> Config {
        Config::from_toml(CONFIG).unwrap()
    }

    #[test]
    fn test_scan_filters_names() {
        let dir = tempdir().unwrap();
        for name in [
            "export_0105.csv",
            "export_0104.xlsx",
            "~$export_0105.xlsx",
            "export_notes.txt",
            "ledger_bak_export.csv",
            "other.csv",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        fs::create_dir(dir.path().join("export_dir.csv")).unwrap();

        let scanner = SourceScanner::new("export").exclude_prefix("ledger_bak");
        let files = scanner.scan(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["export_0104.xlsx", "export_0105.csv"]);
    }

    #[test]
    fn test_scan_excludes_ledger_file() {
        let dir = tempdir().unwrap();
        let ledger = dir.path().join("export_ledger.csv");
        fs::write(&ledger, "x").unwrap();
        fs::write(dir.path().join("export_1.csv"), "x").unwrap();

        let files = SourceScanner::new("export")
            .exclude_file(&ledger)
            .scan(dir.path())
            .unwrap();

        assert_eq!(files, vec![dir.path().join("export_1.csv")]);
    }

    #[test]
    fn test_scan_excludes_ledger_reached_by_another_path() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let ledger = dir.path().join("export_ledger.csv");
        fs::write(&ledger, "x").unwrap();
        fs::write(dir.path().join("export_1.csv"), "x").unwrap();

        // Same directory, spelled differently from the ledger path
        let scan_dir = dir.path().join("sub").join("..");
        let files = SourceScanner::new("export")
            .exclude_file(&ledger)
            .scan(&scan_dir)
            .unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["export_1.csv"]);
    }

    #[test]
    fn test_table_to_batch_filters_and_renames() {
        let reader = SourceReader::new(&test_config());
        let mut table = Table::new(
            ["phone", "received_at", "province", "content"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        table.push_row(vec!["A".into(), "2024-01-01".into(), "North".into(), "slow".into()]);
        table.push_row(vec!["B".into(), "2024-01-01".into(), "South".into(), "spam".into()]);
        table.push_row(vec!["A".into(), "2024-01-02".into(), "North".into(), "".into()]);

        let batch = reader.table_to_batch(&table, Path::new("export.csv")).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].identifier, "A");
        assert_eq!(batch[0].first_seen, "2024-01-01");
        assert_eq!(batch[0].attribute("content"), Some("slow"));
        assert_eq!(batch[0].attribute("province"), Some("North"));
        assert_eq!(batch[0].attribute("received_at"), None);
        assert_eq!(batch[1].first_seen, "2024-01-02");
        assert_eq!(batch[1].count, None);
    }

    #[test]
    fn test_missing_timestamp_column() {
        let reader = SourceReader::new(&test_config());
        let table = Table::new(vec!["phone".into(), "province".into()]);

        let err = reader.table_to_batch(&table, Path::new("export.csv")).unwrap_err();
        assert!(matches!(err, ReconError::InputSchema(_)));
        assert!(err.to_string().contains("received_at"));
    }

    #[test]
    fn test_missing_identifier_value_names_row() {
        let reader = SourceReader::new(&test_config());
        let mut table = Table::new(
            ["phone", "received_at", "province"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        table.push_row(vec!["".into(), "2024-01-01".into(), "North".into()]);

        let err = reader.table_to_batch(&table, Path::new("export.csv")).unwrap_err();
        assert!(err.to_string().contains("row 2: missing identifier"));
    }

    #[test]
    fn test_ingest_concatenates_in_file_order() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("export_1.csv");
        let second = dir.path().join("export_2.csv");
        fs::write(&first, "phone,received_at,province\nA,2024-01-02,North\nB,2024-01-02,South\n").unwrap();
        fs::write(&second, "phone,received_at,province\nC,2024-01-01,North\n").unwrap();

        let reader = SourceReader::new(&test_config());
        let ingested = reader.ingest(&[first.clone(), second]).unwrap();

        let ids: Vec<&str> = ingested.batch.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(ingested.sources[0].path, first);
        assert_eq!(ingested.sources[0].rows_read, 2);
        assert_eq!(ingested.sources[0].rows_kept, 1);
    }

    fn write_xlsx_export(path: &Path, rows: &[(&str, (u16, u8, u8, u16, u8), &str)]) {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        let date_format = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        for (col, header) in ["phone", "received_at", "province"].iter().enumerate() {
            sheet.write_string(0, col as u16, *header).unwrap();
        }
        for (i, (phone, (y, mo, d, h, mi), province)) in rows.iter().enumerate() {
            let row = i as u32 + 1;
            let when = rust_xlsxwriter::ExcelDateTime::from_ymd(*y, *mo, *d)
                .unwrap()
                .and_hms(*h, *mi, 0)
                .unwrap();
            // Numeric phone cell, as spreadsheet exports usually have
            sheet.write_number(row, 0, phone.parse::<f64>().unwrap()).unwrap();
            sheet
                .write_datetime_with_format(row, 1, &when, &date_format)
                .unwrap();
            sheet.write_string(row, 2, *province).unwrap();
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn test_xlsx_source_dates_become_sortable_first_seen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export_0110.xlsx");
        write_xlsx_export(
            &path,
            &[
                ("13800000001", (2024, 1, 10, 7, 0), "North"),
                ("13800000001", (2024, 1, 9, 18, 45), "North"),
                ("13800000002", (2024, 1, 2, 8, 30), "North"),
                ("13800000003", (2024, 1, 2, 8, 30), "South"),
            ],
        );

        let reader = SourceReader::new(&test_config());
        let (batch, stat) = reader.read_file(&path).unwrap();

        assert_eq!(stat.rows_read, 4);
        assert_eq!(stat.rows_kept, 3);
        assert_eq!(batch[0].identifier, "13800000001");
        assert_eq!(batch[0].first_seen, "2024-01-10 07:00:00");
        assert_eq!(batch[1].first_seen, "2024-01-09 18:45:00");
        assert_eq!(batch[2].first_seen, "2024-01-02 08:30:00");

        let ledger = crate::deduplication::BatchDeduplicator::new()
            .deduplicate(batch)
            .unwrap();
        let ids: Vec<&str> = ledger.identifiers().collect();
        assert_eq!(ids, vec!["13800000002", "13800000001"]);
        let repeat = ledger.get("13800000001").unwrap();
        assert_eq!(repeat.first_seen, "2024-01-09 18:45:00");
        assert_eq!(repeat.last_seen.as_deref(), Some("2024-01-10 07:00:00"));
        assert_eq!(repeat.count, Some(2));
    }

    #[test]
    fn test_encrypted_source_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export_20240105.xlsx");
        // Password-protected OOXML is wrapped in an OLE compound file
        let mut content = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        content.resize(512, 0);
        fs::write(&path, content).unwrap();

        let reader = SourceReader::new(&test_config());
        let err = reader.read_file(&path).unwrap_err();
        assert!(matches!(err, ReconError::EncryptedSource(p) if p == path));
    }
}
