//! DuckDB-backed storage for records and the symptom taxonomy

use crate::error::{CaretabError, Result};
use crate::schema::CanonicalSchema;
use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Table holding imported caregiver records
pub const RECORDS_TABLE: &str = "data";
pub const CATEGORY_TABLE: &str = "category";
pub const SYMPTOM_TABLE: &str = "symptom_categories";

const TAXONOMY_DDL: &str = "
CREATE SEQUENCE IF NOT EXISTS category_id_seq START 1;
CREATE TABLE IF NOT EXISTS category (
    id BIGINT PRIMARY KEY DEFAULT nextval('category_id_seq'),
    category VARCHAR NOT NULL
);
CREATE SEQUENCE IF NOT EXISTS symptom_seq START 1;
CREATE TABLE IF NOT EXISTS symptom_categories (
    symptom VARCHAR PRIMARY KEY,
    category_id BIGINT,
    seq BIGINT NOT NULL DEFAULT nextval('symptom_seq')
);
";

/// Quote an identifier for interpolation into SQL
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Summary of the records table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStats {
    pub total_rows: u64,
    pub unique_persons: u64,
}

/// Shared handle to the caretab database.
///
/// All writes go through the primary connection behind a mutex, so commits
/// and taxonomy mutations are serialized. Readers get their own cloned
/// connection and run against a consistent snapshot without blocking writers.
pub struct Database {
    connection: Mutex<Connection>,
    schema: CanonicalSchema,
    location: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) a database file
    pub fn open(path: &Path, schema: &CanonicalSchema) -> Result<Self> {
        let connection = Connection::open(path)?;
        log::debug!("Opened database at {}", path.display());
        Self::from_connection(connection, schema, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory(schema: &CanonicalSchema) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, schema, None)
    }

    fn from_connection(connection: Connection, schema: &CanonicalSchema, location: Option<PathBuf>) -> Result<Self> {
        connection.execute_batch(TAXONOMY_DDL)?;
        connection.execute_batch(&records_table_ddl(schema))?;
        Ok(Self {
            connection: Mutex::new(connection),
            schema: schema.clone(),
            location,
        })
    }

    pub fn schema(&self) -> &CanonicalSchema {
        &self.schema
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Lock the primary connection for writing
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| CaretabError::poisoned("database"))
    }

    /// A separate connection to the same database for read-only work
    pub fn reader(&self) -> Result<Connection> {
        Ok(self.lock()?.try_clone()?)
    }

    /// Column names of `table` in declaration order
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.reader()?;
        table_columns(&conn, table)
    }

    pub fn record_count(&self) -> Result<u64> {
        let conn = self.reader()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(RECORDS_TABLE));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Row count and distinct non-blank person identifiers
    pub fn stats(&self) -> Result<RecordStats> {
        let total_rows = self.record_count()?;
        let Some(identity) = self.schema.columns().first() else {
            return Ok(RecordStats { total_rows, unique_persons: 0 });
        };

        let conn = self.reader()?;
        if !table_columns(&conn, RECORDS_TABLE)?.contains(&identity.name) {
            log::warn!("Records table has no '{}' column", identity.name);
            return Ok(RecordStats { total_rows, unique_persons: 0 });
        }

        let sql = format!(
            "SELECT COUNT(DISTINCT NULLIF(TRIM({col}), '')) FROM {table}",
            col = quote_identifier(&identity.name),
            table = quote_identifier(RECORDS_TABLE)
        );
        let unique: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(RecordStats {
            total_rows,
            unique_persons: unique.max(0) as u64,
        })
    }
}

/// Column names of `table` on an existing connection
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_name = ? ORDER BY ordinal_position",
    )?;
    let names = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

fn records_table_ddl(schema: &CanonicalSchema) -> String {
    let columns = schema
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.kind.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_identifier(RECORDS_TABLE),
        columns
    )
}
