//! Coercion of raw upload text into typed column values

use crate::schema::ColumnKind;
use chrono::{NaiveDate, NaiveDateTime};

/// Spellings caregivers use for "no value"
const NULL_SPELLINGS: &[&str] = &["none", "nan", "null", "n/a"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%m-%d-%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M", "%Y-%m-%d %H:%M"];

/// A coerced cell ready to be bound to an insert statement
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Date(NaiveDate),
    Number(f64),
}

impl CellValue {
    /// Coerce raw text according to the column kind. Unparsable dates and
    /// numbers become `Null` rather than failing the import.
    pub fn coerce(raw: &str, kind: ColumnKind) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        match kind {
            ColumnKind::Text => Self::Text(trimmed.to_string()),
            ColumnKind::Date => parse_date(trimmed).map(Self::Date).unwrap_or(Self::Null),
            ColumnKind::Number => parse_number(trimmed).map(Self::Number).unwrap_or(Self::Null),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl duckdb::ToSql for CellValue {
    fn to_sql(&self) -> duckdb::Result<duckdb::types::ToSqlOutput<'_>> {
        use duckdb::types::{ToSqlOutput, Value};
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
            Self::Date(d) => ToSqlOutput::Owned(Value::Text(d.format("%Y-%m-%d").to_string())),
            Self::Number(n) => ToSqlOutput::Owned(Value::Double(*n)),
        })
    }
}

fn is_null_spelling(value: &str) -> bool {
    NULL_SPELLINGS.iter().any(|s| value.eq_ignore_ascii_case(s))
}

/// Parse a date written in any of the accepted day/month orders
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() || is_null_spelling(value) {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Parse a finite number; anything else is treated as missing
pub fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || is_null_spelling(value) {
        return None;
    }
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}
