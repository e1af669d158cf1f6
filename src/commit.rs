//! Writing previewed datasets into the records table

use crate::error::{CaretabError, Result};
use crate::preview::PreviewCache;
use crate::progress::ProgressReporter;
use crate::schema::{match_columns, ColumnKind};
use crate::storage::{quote_identifier, Database, RECORDS_TABLE};
use crate::values::CellValue;
use duckdb::params_from_iter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How committed rows combine with what is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Keep existing records and add the new ones
    Append,
    /// Replace every stored record with the upload
    Overwrite,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitRequest {
    pub token: String,
    pub mode: ImportMode,
    #[serde(default)]
    pub confirmed: bool,
}

impl CommitRequest {
    pub fn new(token: impl Into<String>, mode: ImportMode) -> Self {
        Self {
            token: token.into(),
            mode,
            confirmed: false,
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub mode: ImportMode,
    pub inserted: u64,
    pub total_rows_in_file: u64,
    /// Rows deleted by an overwrite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced: Option<u64>,
}

/// A canonical column that can be written: where to read it and where it goes
struct WriteTarget {
    csv_column: String,
    db_column: String,
    kind: ColumnKind,
}

/// Commits previewed uploads to storage
pub struct CommitEngine<'a> {
    db: &'a Database,
    cache: &'a PreviewCache,
}

impl<'a> CommitEngine<'a> {
    pub fn new(db: &'a Database, cache: &'a PreviewCache) -> Self {
        Self { db, cache }
    }

    pub fn commit(&self, request: &CommitRequest) -> Result<CommitReport> {
        self.commit_with_progress(request, &mut ProgressReporter::new_minimal())
    }

    /// Consume the token and write its rows in one transaction.
    ///
    /// Nothing is written unless every row is; on any failure the dataset
    /// goes back to the cache and the token stays usable.
    pub fn commit_with_progress(
        &self,
        request: &CommitRequest,
        progress: &mut ProgressReporter,
    ) -> Result<CommitReport> {
        if request.mode == ImportMode::Overwrite && !request.confirmed {
            return Err(CaretabError::ConfirmationRequired);
        }

        let lease = self.cache.checkout(&request.token)?;
        let dataset = lease.dataset();
        if !dataset.column_match.can_import {
            return Err(CaretabError::SchemaIncomplete {
                missing: dataset.column_match.missing_in_csv.clone(),
            });
        }

        let targets = self.write_targets(&dataset.csv_columns)?;
        let total_rows = dataset.rows.len() as u64;
        progress.set_total_rows(total_rows);
        progress.finish_stage(&format!("Loaded preview of '{}'", dataset.filename));

        let sql = insert_statement(&targets);
        log::debug!("Commit statement: {}", sql);

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        let replaced = match request.mode {
            ImportMode::Overwrite => {
                let deleted = tx.execute(&format!("DELETE FROM {}", quote_identifier(RECORDS_TABLE)), [])?;
                Some(deleted as u64)
            }
            ImportMode::Append => None,
        };

        let mut inserted = 0u64;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in &dataset.rows {
                let values: Vec<CellValue> = targets
                    .iter()
                    .map(|t| {
                        let raw = row.get(&t.csv_column).map(String::as_str).unwrap_or("");
                        CellValue::coerce(raw, t.kind)
                    })
                    .collect();
                inserted += stmt.execute(params_from_iter(values.iter()))? as u64;
                progress.update_rows(inserted);
            }
        }

        tx.commit()?;
        drop(conn);
        progress.finish_rows(&format!("Wrote {} rows", inserted));

        let report = CommitReport {
            mode: request.mode,
            inserted,
            total_rows_in_file: total_rows,
            replaced,
        };
        let filename = dataset.filename.clone();
        lease.consume();

        log::info!(
            "Committed '{}' ({}): {} of {} rows inserted",
            filename,
            report.mode,
            report.inserted,
            report.total_rows_in_file
        );
        Ok(report)
    }

    /// Canonical columns present in both the upload and the records table
    fn write_targets(&self, csv_columns: &[String]) -> Result<Vec<WriteTarget>> {
        let storage_columns = self.db.table_columns(RECORDS_TABLE)?;
        let schema = self.db.schema();
        let mapping = match_columns(csv_columns, schema, &storage_columns);

        let targets: Vec<WriteTarget> = schema
            .columns()
            .iter()
            .filter_map(|column| {
                let csv_column = mapping.csv_column(&column.name)?;
                let db_column = mapping.db_column(&column.name)?;
                Some(WriteTarget {
                    csv_column: csv_column.to_string(),
                    db_column: db_column.to_string(),
                    kind: column.kind,
                })
            })
            .collect();

        for missing in &mapping.missing_in_db {
            log::warn!("Records table has no column for '{}'; its values are not stored", missing);
        }
        if targets.is_empty() {
            return Err(CaretabError::storage(
                "records table has none of the canonical columns",
            ));
        }
        Ok(targets)
    }
}

fn insert_statement(targets: &[WriteTarget]) -> String {
    let columns = targets
        .iter()
        .map(|t| quote_identifier(&t.db_column))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = targets
        .iter()
        .map(|t| match t.kind {
            ColumnKind::Date => "CAST(? AS DATE)",
            ColumnKind::Number => "CAST(? AS DOUBLE)",
            ColumnKind::Text => "?",
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(RECORDS_TABLE),
        columns,
        placeholders
    )
}
