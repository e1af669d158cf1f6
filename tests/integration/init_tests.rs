//! Integration tests for the init command

use crate::common::{assertions, CliTestRunner, TestFixture};
use caretab::cli::OutputFormat;
use caretab::cli::Commands;
use caretab::commands::execute_command;
use caretab::storage::{CATEGORY_TABLE, RECORDS_TABLE, SYMPTOM_TABLE};
use std::fs;

#[test]
fn test_init_creates_workspace() {
    let fixture = TestFixture::new_empty().unwrap();

    execute_command(Commands::Init { force: false }, Some(fixture.root()), OutputFormat::Pretty).unwrap();

    let ws = &fixture.workspace;
    assertions::assert_dir_exists(&ws.caretab_dir);
    assertions::assert_dir_exists(&ws.staging_dir);
    assertions::assert_file_exists_and_not_empty(&ws.database_path());
    assertions::assert_json_contains_keys(
        &ws.config_path(),
        &[
            "format_version",
            "created",
            "max_upload_bytes",
            "preview_ttl_secs",
            "preview_row_limit",
            "risk_column",
            "feature_prefix",
        ],
    )
    .unwrap();
}

#[test]
fn test_init_creates_tables() {
    let fixture = TestFixture::new_empty().unwrap();
    execute_command(Commands::Init { force: false }, Some(fixture.root()), OutputFormat::Pretty).unwrap();

    let db = fixture.database().unwrap();
    let schema_names = db.schema().names();
    assert_eq!(db.table_columns(RECORDS_TABLE).unwrap(), schema_names);
    assert_eq!(db.table_columns(CATEGORY_TABLE).unwrap(), vec!["id", "category"]);
    assert_eq!(db.table_columns(SYMPTOM_TABLE).unwrap(), vec!["symptom", "category_id", "seq"]);
    assert_eq!(db.record_count().unwrap(), 0);
}

#[test]
fn test_init_writes_gitignore() {
    let fixture = TestFixture::new_empty().unwrap();
    execute_command(Commands::Init { force: false }, Some(fixture.root()), OutputFormat::Pretty).unwrap();

    let gitignore = fs::read_to_string(fixture.root().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".caretab/*.duckdb*"));
    assert!(gitignore.contains(".caretab/staging/"));
}

#[test]
fn test_init_is_idempotent() {
    let runner = CliTestRunner::new().unwrap();
    let ws = &runner.fixture().workspace;
    let before = fs::read_to_string(ws.config_path()).unwrap();

    runner.expect_success(&["init"]);
    runner.expect_success(&["init"]);

    assert_eq!(fs::read_to_string(ws.config_path()).unwrap(), before);
    let gitignore = fs::read_to_string(ws.root.join(".gitignore")).unwrap();
    assert_eq!(gitignore.matches(".caretab/staging/").count(), 1);
}

#[test]
fn test_init_force_resets_config() {
    let runner = CliTestRunner::new().unwrap();
    let ws = &runner.fixture().workspace;
    fs::write(ws.config_path(), r#"{"risk_column": "Diagnoses"}"#).unwrap();

    runner.expect_success(&["init", "--force"]);

    let config = ws.load_config().unwrap();
    assert_eq!(config.risk_column, caretab::DEFAULT_RISK_COLUMN);
    assert!(config.created.is_some());
}

#[test]
fn test_init_keeps_stored_records() {
    let runner = CliTestRunner::new().unwrap();
    let file = runner.fixture().create_records_csv("records.csv", 4).unwrap();
    runner.expect_success(&["preview", file.to_str().unwrap()]);
    let token = runner.staged_token();
    runner.expect_success(&["commit", &token]);

    runner.expect_success(&["init", "--force"]);

    let db = runner.fixture().database().unwrap();
    assert_eq!(db.record_count().unwrap(), 4);
}
