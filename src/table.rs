// 📊 Table - Header + string rows, read from and written to CSV / workbooks
//
// Both the ledger store and the source reader go through this type, so the
// role mapping only has to deal with one shape.

use crate::error::{ReconError, Result};
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

// ============================================================================
// FILE FORMAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Workbook,
}

impl TableFormat {
    /// Detect format from the file extension
    pub fn from_path(path: &Path) -> Option<TableFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(TableFormat::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(TableFormat::Workbook),
            _ => None,
        }
    }
}

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Table {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell value, empty when the row is shorter than the header
    pub fn cell<'a>(&self, row: &'a [String], column: usize) -> &'a str {
        row.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Read a table, picking the reader from the file extension
    pub fn read(path: &Path, sheet: Option<&str>) -> Result<Table> {
        match TableFormat::from_path(path) {
            Some(TableFormat::Csv) => Table::read_csv(path),
            Some(TableFormat::Workbook) => Table::read_workbook(path, sheet),
            None => Err(ReconError::spreadsheet(path, "unsupported file extension")),
        }
    }

    pub fn read_csv(path: &Path) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut table = Table::new(headers);

        for record in reader.records() {
            let record = record?;
            if record.iter().all(|v| v.trim().is_empty()) {
                continue;
            }
            table.push_row(record.iter().map(|v| v.to_string()).collect());
        }

        Ok(table)
    }

    /// Read one worksheet; the first row of the used range is the header
    pub fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<Table> {
        if is_encrypted_workbook(path)? {
            return Err(ReconError::EncryptedSource(path.to_path_buf()));
        }

        let mut workbook =
            open_workbook_auto(path).map_err(|e| ReconError::spreadsheet(path, e))?;

        let sheet_name = match sheet {
            Some(name) => name.to_string(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| ReconError::spreadsheet(path, "workbook contains no sheets"))?,
        };

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ReconError::spreadsheet(path, format!("sheet '{}': {}", sheet_name, e)))?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row
                .iter()
                .map(|cell| cell_to_string(cell).trim().to_string())
                .collect(),
            None => return Ok(Table::default()),
        };

        let mut table = Table::new(headers);
        for row in rows {
            let values: Vec<String> = row.iter().map(cell_to_string).collect();
            if values.iter().all(|v| v.trim().is_empty()) {
                continue;
            }
            table.push_row(values);
        }

        Ok(table)
    }

    /// Write the table, picking the writer from the file extension
    pub fn write(&self, path: &Path, sheet: &str) -> Result<()> {
        match TableFormat::from_path(path) {
            Some(format) => self.write_as(path, format, sheet),
            None => Err(ReconError::spreadsheet(path, "unsupported file extension")),
        }
    }

    pub fn write_as(&self, path: &Path, format: TableFormat, sheet: &str) -> Result<()> {
        match format {
            TableFormat::Csv => self.write_csv(path),
            TableFormat::Workbook => self.write_workbook(path, sheet),
        }
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush().map_err(|e| ReconError::io(path, e))?;
        Ok(())
    }

    pub fn write_workbook(&self, path: &Path, sheet: &str) -> Result<()> {
        let xlsx_err = |e: rust_xlsxwriter::XlsxError| ReconError::spreadsheet(path, e);

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet).map_err(xlsx_err)?;

        for (col, header) in self.headers.iter().enumerate() {
            worksheet
                .write_string(0, col as u16, header)
                .map_err(xlsx_err)?;
        }
        for (row_idx, row) in self.rows.iter().enumerate() {
            for (col, value) in row.iter().enumerate() {
                // Leave empty cells blank rather than writing ""
                if value.is_empty() {
                    continue;
                }
                worksheet
                    .write_string(row_idx as u32 + 1, col as u16, value)
                    .map_err(xlsx_err)?;
            }
        }

        workbook.save(path).map_err(xlsx_err)?;
        Ok(())
    }
}

/// OLE compound file signature
const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// An OOXML workbook (zip) stored inside a compound file is password protected.
/// Legacy .xls files are compound files by nature and are never flagged.
pub fn is_encrypted_workbook(path: &Path) -> Result<bool> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if !matches!(ext.as_deref(), Some("xlsx") | Some("xlsm") | Some("xlsb")) {
        return Ok(false);
    }

    let mut magic = [0u8; 8];
    let mut file = File::open(path).map_err(|e| ReconError::io(path, e))?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == CFB_MAGIC),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(ReconError::io(path, e)),
    }
}

/// Stringify a workbook cell the way it reads on screen
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(n) => n.to_string(),
        Data::Float(n) => {
            // Integers without decimals so numeric identifiers survive
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        // Same shape as DateTime so both sort together
        Data::DateTimeIso(s) => s.replacen('T', " ", 1),
        other => other.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_format_detection() {
        assert_eq!(TableFormat::from_path(Path::new("a.csv")), Some(TableFormat::Csv));
        assert_eq!(TableFormat::from_path(Path::new("a.XLSX")), Some(TableFormat::Workbook));
        assert_eq!(TableFormat::from_path(Path::new("a.txt")), None);
        assert_eq!(TableFormat::from_path(Path::new("ledger")), None);
    }

    #[test]
    fn test_read_csv_pads_and_skips_blank_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(&path, "id,time,note\nA,2024-01-01,x\n,,\nB,2024-01-02\n").unwrap();

        let table = Table::read_csv(&path).unwrap();

        assert_eq!(table.headers, vec!["id", "time", "note"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["B", "2024-01-02", ""]);
        assert_eq!(table.column_index("note"), Some(2));
        assert_eq!(table.column_index("missing"), None);
    }

    #[test]
    fn test_csv_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut table = Table::new(vec!["id".into(), "note".into()]);
        table.push_row(vec!["A".into(), "has, comma".into()]);
        table.push_row(vec!["B".into()]);

        table.write(&path, "Sheet1").unwrap();
        let read = Table::read(&path, None).unwrap();

        assert_eq!(read, table);
    }

    #[test]
    fn test_workbook_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut table = Table::new(vec!["id".into(), "first".into(), "count".into()]);
        table.push_row(vec!["13800000000".into(), "2024-01-01 08:00:00".into(), "2".into()]);
        table.push_row(vec!["13900000000".into(), "2024-01-02 09:30:00".into(), "".into()]);

        table.write(&path, "Ledger").unwrap();
        let read = Table::read(&path, Some("Ledger")).unwrap();

        assert_eq!(read, table);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Table::read(Path::new("notes.txt"), None).unwrap_err();
        assert!(matches!(err, ReconError::Spreadsheet { .. }));
    }

    #[test]
    fn test_date_cells_render_as_sortable_text() {
        // 45293 is 2024-01-02 in the 1900 date system
        let morning = Data::DateTime(ExcelDateTime::new(
            45293.0 + 8.5 / 24.0,
            ExcelDateTimeType::DateTime,
            false,
        ));
        let midnight = Data::DateTime(ExcelDateTime::new(45300.0, ExcelDateTimeType::DateTime, false));

        assert_eq!(cell_to_string(&morning), "2024-01-02 08:30:00");
        assert_eq!(cell_to_string(&midnight), "2024-01-09 00:00:00");
        assert_eq!(
            cell_to_string(&Data::DateTimeIso("2024-01-10T07:00:00".into())),
            "2024-01-10 07:00:00"
        );
        assert!(cell_to_string(&morning) < cell_to_string(&midnight));
        // Unformatted serials stay numeric
        assert_eq!(cell_to_string(&Data::Float(45293.5)), "45293.5");
    }

    #[test]
    fn test_encrypted_workbook_detection() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.xlsx");
        let mut table = Table::new(vec!["id".into()]);
        table.push_row(vec!["A".into()]);
        table.write(&plain, "Sheet1").unwrap();

        let locked = dir.path().join("locked.xlsx");
        let mut content = CFB_MAGIC.to_vec();
        content.resize(512, 0);
        fs::write(&locked, &content).unwrap();
        let legacy = dir.path().join("legacy.xls");
        fs::write(&legacy, &content).unwrap();

        assert!(!is_encrypted_workbook(&plain).unwrap());
        assert!(is_encrypted_workbook(&locked).unwrap());
        assert!(!is_encrypted_workbook(&legacy).unwrap());
        assert!(matches!(
            Table::read(&locked, None),
            Err(ReconError::EncryptedSource(_))
        ));
    }

    #[test]
    fn test_float_cells_render_without_decimals() {
        assert_eq!(cell_to_string(&Data::Float(13800000000.0)), "13800000000");
        assert_eq!(cell_to_string(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
