//! Canonical record schema and column matching

use crate::normalize::normalize_column_name;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How raw strings of a column are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Text,
    Date,
    Number,
}

impl ColumnKind {
    /// DuckDB column type used when creating the records table
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "VARCHAR",
            Self::Date => "DATE",
            Self::Number => "DOUBLE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl CanonicalColumn {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Fixed, ordered set of columns every import must provide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSchema {
    columns: Vec<CanonicalColumn>,
}

impl CanonicalSchema {
    pub fn new(columns: Vec<CanonicalColumn>) -> Self {
        Self { columns }
    }

    /// The caregiver record layout: identity, care period, risk factors and
    /// nutrition measurements.
    pub fn caregiver_records() -> Self {
        use ColumnKind::*;
        Self::new(vec![
            CanonicalColumn::new("PersonID", Text),
            CanonicalColumn::new("Start date", Date),
            CanonicalColumn::new("End date", Date),
            CanonicalColumn::new("M-Risk Factors", Text),
            CanonicalColumn::new("Gender", Text),
            CanonicalColumn::new("Age", Number),
            CanonicalColumn::new("MNA", Number),
            CanonicalColumn::new("BMI", Number),
            CanonicalColumn::new("Weight", Number),
        ])
    }

    pub fn columns(&self) -> &[CanonicalColumn] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Default for CanonicalSchema {
    fn default() -> Self {
        Self::caregiver_records()
    }
}

/// Result of matching uploaded headers and the storage table against the
/// canonical schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMatchResult {
    pub expected_columns: Vec<String>,
    /// Canonical column -> uploaded header that satisfies it
    pub csv_to_expected: IndexMap<String, Option<String>>,
    /// Canonical column -> storage column that receives it
    pub expected_to_db: IndexMap<String, Option<String>>,
    pub missing_in_csv: Vec<String>,
    pub missing_in_db: Vec<String>,
    /// Uploaded headers ignored because an earlier header normalized to the same name
    #[serde(default)]
    pub duplicate_columns: Vec<String>,
    pub can_import: bool,
}

impl ColumnMatchResult {
    /// Uploaded header mapped to `expected`, if any
    pub fn csv_column(&self, expected: &str) -> Option<&str> {
        self.csv_to_expected.get(expected).and_then(|c| c.as_deref())
    }

    /// Storage column mapped to `expected`, if any
    pub fn db_column(&self, expected: &str) -> Option<&str> {
        self.expected_to_db.get(expected).and_then(|c| c.as_deref())
    }
}

/// Index names by normalized form; the first occurrence wins and later
/// duplicates are returned separately.
fn index_names(names: &[String]) -> (HashMap<String, &str>, Vec<String>) {
    let mut index = HashMap::new();
    let mut duplicates = Vec::new();
    for name in names {
        let key = normalize_column_name(name);
        if index.contains_key(&key) {
            duplicates.push(name.clone());
        } else {
            index.insert(key, name.as_str());
        }
    }
    (index, duplicates)
}

fn map_to(
    schema: &CanonicalSchema,
    index: &HashMap<String, &str>,
) -> (IndexMap<String, Option<String>>, Vec<String>) {
    let mut mapping = IndexMap::new();
    let mut missing = Vec::new();
    for column in schema.columns() {
        let found = index
            .get(&normalize_column_name(&column.name))
            .map(|name| name.to_string());
        if found.is_none() {
            missing.push(column.name.clone());
        }
        mapping.insert(column.name.clone(), found);
    }
    (mapping, missing)
}

/// Match uploaded headers and storage columns against the canonical schema.
///
/// Storage-side gaps are reported but only `missing_in_csv` decides
/// `can_import`.
pub fn match_columns(
    csv_columns: &[String],
    schema: &CanonicalSchema,
    storage_columns: &[String],
) -> ColumnMatchResult {
    let (csv_index, duplicate_columns) = index_names(csv_columns);
    let (db_index, _) = index_names(storage_columns);

    let (csv_to_expected, missing_in_csv) = map_to(schema, &csv_index);
    let (expected_to_db, missing_in_db) = map_to(schema, &db_index);

    if !duplicate_columns.is_empty() {
        log::warn!(
            "Ignoring duplicate headers (first occurrence wins): {}",
            duplicate_columns.join(", ")
        );
    }

    let can_import = missing_in_csv.is_empty();
    ColumnMatchResult {
        expected_columns: schema.names(),
        csv_to_expected,
        expected_to_db,
        missing_in_csv,
        missing_in_db,
        duplicate_columns,
        can_import,
    }
}
