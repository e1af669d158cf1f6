//! Delimited upload parsing using DuckDB

use crate::error::{CaretabError, Result};
use duckdb::types::ValueRef;
use duckdb::Connection;
use indexmap::IndexMap;
use std::io::Write;
use std::path::Path;

/// One parsed row: header -> raw cell text, in upload column order
pub type Record = IndexMap<String, String>;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Headers and rows of a parsed upload
#[derive(Debug, Clone, Default)]
pub struct ParsedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl ParsedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Data processor for uploaded delimited files
pub struct DataProcessor {
    connection: Connection,
}

impl DataProcessor {
    pub fn new() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch("SET enable_progress_bar=false;")?;
        Ok(Self { connection })
    }

    /// Parse uploaded bytes. The delimiter is sniffed, the first row is the
    /// header and every cell is kept as text.
    ///
    /// DuckDB reads from files, so the bytes are staged in a temporary file
    /// under `scratch_dir` (or the system temp directory) for the duration
    /// of the parse.
    pub fn parse_bytes(&self, bytes: &[u8], filename: &str, scratch_dir: Option<&Path>) -> Result<ParsedTable> {
        let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(CaretabError::parse_failure(filename, "file is empty"));
        }

        let mut builder = tempfile::Builder::new();
        builder.prefix("caretab-upload-").suffix(".csv");
        let mut staged = match scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        staged.write_all(content)?;
        staged.flush()?;

        let table = self.load_staged(staged.path(), filename)?;
        log::debug!(
            "Parsed '{}': {} columns, {} rows",
            filename,
            table.column_count(),
            table.row_count()
        );
        Ok(table)
    }

    fn load_staged(&self, path: &Path, filename: &str) -> Result<ParsedTable> {
        // header = false keeps repeated headers as uploaded; DuckDB would
        // otherwise rename them (`Age, Age_1`)
        let path_literal = path.to_string_lossy().replace('\'', "''");
        let create_sql = format!(
            "CREATE OR REPLACE TEMP TABLE upload_rows AS \
             SELECT * FROM read_csv('{}', header = false, all_varchar = true)",
            path_literal
        );
        self.connection
            .execute_batch(&create_sql)
            .map_err(|e| convert_duckdb_error(e, filename))?;

        let width = self.column_names()?.len();
        let mut cells = self.extract_cells(width)?.into_iter();
        self.connection.execute_batch("DROP TABLE IF EXISTS upload_rows;")?;

        let Some(columns) = cells.next() else {
            return Err(CaretabError::parse_failure(filename, "no header row"));
        };
        let rows = cells
            .map(|row| {
                let mut record = Record::with_capacity(columns.len());
                for (name, value) in columns.iter().zip(row) {
                    // first occurrence of a repeated header wins
                    record.entry(name.clone()).or_insert(value);
                }
                record
            })
            .collect();

        Ok(ParsedTable { columns, rows })
    }

    fn column_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.connection.prepare("DESCRIBE upload_rows")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Every line of the upload, header included, as text cells
    fn extract_cells(&self, width: usize) -> Result<Vec<Vec<String>>> {
        if width == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.connection.prepare("SELECT * FROM upload_rows")?;
        let rows = stmt.query_map([], |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(value_to_string))
                .collect::<std::result::Result<Vec<_>, _>>()
        })?;

        let mut lines = Vec::new();
        for row in rows {
            lines.push(row?);
        }
        Ok(lines)
    }

    /// Check if a file extension is one we accept for upload
    pub fn is_supported_format(file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| matches!(ext.to_lowercase().as_str(), "csv" | "tsv" | "txt"))
            .unwrap_or(false)
    }
}

/// Render a DuckDB value as the text a caregiver would have typed
pub fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Boolean(b) => b.to_string(),
        ValueRef::TinyInt(i) => i.to_string(),
        ValueRef::SmallInt(i) => i.to_string(),
        ValueRef::Int(i) => i.to_string(),
        ValueRef::BigInt(i) => i.to_string(),
        ValueRef::HugeInt(i) => i.to_string(),
        ValueRef::UTinyInt(i) => i.to_string(),
        ValueRef::USmallInt(i) => i.to_string(),
        ValueRef::UInt(i) => i.to_string(),
        ValueRef::UBigInt(i) => i.to_string(),
        ValueRef::Float(f) => f.to_string(),
        ValueRef::Double(f) => f.to_string(),
        ValueRef::Decimal(d) => d.to_string(),
        ValueRef::Text(s) => String::from_utf8_lossy(s).to_string(),
        ValueRef::Blob(b) => format!("<blob:{} bytes>", b.len()),
        other => format!("{:?}", other),
    }
}

/// Convert DuckDB reader errors into parse failures that keep the reader's
/// line and column context.
fn convert_duckdb_error(error: duckdb::Error, filename: &str) -> CaretabError {
    let message = error.to_string();

    if message.contains("CSV Error")
        || message.contains("Could not convert")
        || message.contains("Invalid CSV")
        || message.contains("unterminated quote")
        || message.contains("Unterminated quoted field")
        || message.contains("Invalid unicode")
        || message.contains("UTF-8")
        || message.contains("sniff")
        || message.contains("Expected Number of Columns")
    {
        CaretabError::parse_failure(filename, message)
    } else {
        CaretabError::DuckDb(error)
    }
}
