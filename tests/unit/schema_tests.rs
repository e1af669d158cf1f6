//! Unit tests for schema matching and value coercion

use crate::common::sample_data;
use caretab::schema::{CanonicalColumn, ColumnKind};
use caretab::values::{parse_date, parse_number, CellValue};
use caretab::{match_columns, CanonicalSchema};
use chrono::NaiveDate;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_messy_headers_map_to_every_canonical_column() {
    let schema = CanonicalSchema::caregiver_records();
    let headers = sample_data::messy_headers();

    let result = match_columns(&headers, &schema, &schema.names());

    assert!(result.can_import);
    assert!(result.missing_in_csv.is_empty());
    assert_eq!(result.expected_columns, schema.names());
    assert_eq!(result.csv_column("PersonID"), Some("personid"));
    assert_eq!(result.csv_column("End date"), Some("End Date"));
    assert_eq!(result.csv_column("Age"), Some("AGE"));
    assert_eq!(result.db_column("Weight"), Some("Weight"));
}

#[test]
fn test_mapping_keys_follow_canonical_order() {
    let schema = CanonicalSchema::caregiver_records();
    let mut headers = sample_data::messy_headers();
    headers.reverse();

    let result = match_columns(&headers, &schema, &schema.names());

    let keys: Vec<String> = result.csv_to_expected.keys().cloned().collect();
    assert_eq!(keys, schema.names());
    let keys: Vec<String> = result.expected_to_db.keys().cloned().collect();
    assert_eq!(keys, schema.names());
}

#[test]
fn test_every_missing_column_is_reported() {
    let schema = CanonicalSchema::caregiver_records();
    let headers = strings(&["PersonID", "Gender", "Age"]);

    let result = match_columns(&headers, &schema, &schema.names());

    assert!(!result.can_import);
    assert_eq!(
        result.missing_in_csv,
        strings(&["Start date", "End date", "M-Risk Factors", "MNA", "BMI", "Weight"])
    );
    assert_eq!(result.csv_column("MNA"), None);
}

#[test]
fn test_extra_headers_are_ignored() {
    let schema = CanonicalSchema::caregiver_records();
    let mut headers = schema.names();
    headers.push("Room".to_string());
    headers.insert(0, "Ward".to_string());

    let result = match_columns(&headers, &schema, &schema.names());

    assert!(result.can_import);
    assert!(result.csv_to_expected.values().flatten().all(|c| c != "Room" && c != "Ward"));
}

#[test]
fn test_storage_columns_are_matched_loosely_too() {
    let schema = CanonicalSchema::caregiver_records();
    let storage = strings(&["personid", "START_DATE", "end date"]);

    let result = match_columns(&schema.names(), &schema, &storage);

    assert_eq!(result.db_column("Start date"), Some("START_DATE"));
    assert_eq!(result.missing_in_db.len(), schema.len() - 3);
    assert!(result.can_import);
}

#[test]
fn test_duplicate_headers_are_reported() {
    let schema = CanonicalSchema::caregiver_records();
    let mut headers = schema.names();
    headers.push("person_id".to_string());
    headers.push("PERSONID".to_string());

    let result = match_columns(&headers, &schema, &schema.names());

    assert_eq!(result.csv_column("PersonID"), Some("PersonID"));
    assert_eq!(result.duplicate_columns, strings(&["PERSONID"]));
}

#[test]
fn test_custom_schema() {
    let schema = CanonicalSchema::new(vec![
        CanonicalColumn::new("Resident", ColumnKind::Text),
        CanonicalColumn::new("Admitted", ColumnKind::Date),
    ]);

    let result = match_columns(&strings(&["resident", "ADMITTED"]), &schema, &[]);

    assert!(result.can_import);
    assert_eq!(result.missing_in_db, strings(&["Resident", "Admitted"]));
}

#[test]
fn test_date_parsing_accepts_caregiver_formats() {
    let expected = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
    assert_eq!(parse_date("2024-03-07"), Some(expected));
    assert_eq!(parse_date("07/03/2024"), Some(expected));
    assert_eq!(parse_date(" 07-03-2024 "), Some(expected));
    assert_eq!(parse_date("not a date"), None);
    assert_eq!(parse_date(""), None);
}

#[test]
fn test_number_parsing() {
    assert_eq!(parse_number("21.5"), Some(21.5));
    assert_eq!(parse_number(" 80 "), Some(80.0));
    assert_eq!(parse_number("eighty"), None);
}

#[test]
fn test_coercion_by_column_kind() {
    assert_eq!(CellValue::coerce("", ColumnKind::Text), CellValue::Null);
    assert_eq!(CellValue::coerce("  ", ColumnKind::Number), CellValue::Null);
    assert_eq!(CellValue::coerce("F", ColumnKind::Text), CellValue::Text("F".to_string()));
    assert_eq!(CellValue::coerce("60", ColumnKind::Number), CellValue::Number(60.0));
    assert!(CellValue::coerce("unknown", ColumnKind::Date).is_null());
}
