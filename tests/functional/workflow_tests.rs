//! End-to-end workflows through the command layer

use crate::common::{sample_data, CliTestRunner, TestFixture};
use caretab::features::{read_feature_list, FeatureMatcher, UNCATEGORIZED};
use caretab::reconcile::Classification;
use caretab::taxonomy::SymptomQuery;
use caretab::{CaretabError, Reconciler, TaxonomyStore};
use serde_json::json;
use std::fs;

fn category_id(runner: &CliTestRunner, name: &str) -> i64 {
    let db = runner.fixture().database().unwrap();
    let categories = TaxonomyStore::new(&db).list_categories().unwrap();
    categories
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.id)
        .expect("category should exist")
}

#[test]
fn test_full_ingestion_workflow() {
    let runner = CliTestRunner::new().unwrap();
    let upload = runner.fixture().create_records_csv("march.csv", 25).unwrap();

    // Preview and append
    runner.expect_success(&["preview", upload.to_str().unwrap()]);
    let token = runner.staged_token();
    runner.expect_success(&["commit", &token]);

    // Build a taxonomy from the worklist
    runner.expect_success(&["category", "add", "Bowel"]);
    runner.expect_success(&["category", "add", "General"]);
    let bowel = category_id(&runner, "Bowel").to_string();
    let general = category_id(&runner, "General");
    runner.expect_success(&["scan"]);
    runner.expect_success(&["resolve", "--symptom", "Constipation", "--category-id", &bowel]);
    let worklist = runner
        .fixture()
        .create_json(
            "worklist.json",
            &json!([
                {"symptom": "fatigue", "category_id": general},
                {"symptom": "Infection", "category_id": general}
            ]),
        )
        .unwrap();
    runner.expect_success(&["resolve", worklist.to_str().unwrap(), "--format", "json"]);

    {
        let db = runner.fixture().database().unwrap();
        assert_eq!(db.record_count().unwrap(), 25);
        let report = Reconciler::new(&db).scan(caretab::DEFAULT_RISK_COLUMN).unwrap();
        let names: Vec<&str> = report.missing_items.iter().map(|i| i.symptom.as_str()).collect();
        assert_eq!(names, vec!["Falls", "poor appetite"]);
        assert_eq!(report.count(Classification::New), 2);
    }

    // Replace the records with a smaller upload
    let april = runner.fixture().create_records_csv("april.csv", 5).unwrap();
    runner.expect_success(&["preview", april.to_str().unwrap()]);
    let token = runner.staged_token();
    runner.expect_success(&["commit", &token, "--mode", "overwrite", "--confirm"]);
    runner.expect_success(&["stats"]);

    let db = runner.fixture().database().unwrap();
    let stats = db.stats().unwrap();
    assert_eq!(stats.total_rows, 5);
    assert_eq!(stats.unique_persons, 5);
    // The taxonomy is independent of the stored records
    assert_eq!(
        TaxonomyStore::new(&db).list_symptoms(&SymptomQuery::default()).unwrap().len(),
        3
    );
}

#[test]
fn test_preview_failure_leaves_nothing_staged() {
    let runner = CliTestRunner::new().unwrap();
    let blank = runner.fixture().create_csv_raw("blank.csv", "   \n").unwrap();

    let err = runner.expect_failure(&["preview", blank.to_str().unwrap()]);

    assert!(matches!(err, CaretabError::ParseFailure { .. }));
    assert_eq!(fs::read_dir(&runner.fixture().workspace.staging_dir).unwrap().count(), 0);
}

#[test]
fn test_commit_with_json_output() {
    let runner = CliTestRunner::new().unwrap();
    let upload = runner.fixture().create_records_csv("records.csv", 2).unwrap();

    runner.expect_success(&["preview", upload.to_str().unwrap(), "--format", "json"]);
    let token = runner.staged_token();
    runner.expect_success(&["commit", &token, "--format", "json"]);

    assert_eq!(runner.fixture().database().unwrap().record_count().unwrap(), 2);
}

#[test]
fn test_upload_size_limit_from_config() {
    let runner = CliTestRunner::new().unwrap();
    let ws = &runner.fixture().workspace;
    let mut config = ws.load_config().unwrap();
    config.max_upload_bytes = 64;
    config.save(&ws.config_path(), true).unwrap();
    let upload = runner.fixture().create_records_csv("records.csv", 10).unwrap();

    let err = runner.expect_failure(&["preview", upload.to_str().unwrap()]);

    assert!(matches!(err, CaretabError::FileTooLarge { limit: 64, .. }));
}

#[test]
fn test_cleanup_command() {
    let runner = CliTestRunner::new().unwrap();
    let ws = &runner.fixture().workspace;
    let upload = runner.fixture().create_records_csv("records.csv", 2).unwrap();
    runner.expect_success(&["preview", upload.to_str().unwrap()]);
    let token = runner.staged_token();

    // Live previews survive cleanup
    runner.expect_success(&["cleanup"]);
    assert!(ws.staging_dir.join(format!("{}.json", token)).exists());

    // An unreadable staged file is treated as expired; a dry run only lists it
    let garbage = ws.staging_dir.join("0123456789abcdef0123456789abcdef.json");
    fs::write(&garbage, "garbage").unwrap();
    runner.expect_success(&["cleanup", "--dry-run"]);
    runner.expect_success(&["cleanup", "--stats", "--format", "json"]);
    assert!(garbage.exists());
    runner.expect_success(&["cleanup", "--format", "json"]);
    assert!(!garbage.exists());
    assert!(ws.staging_dir.join(format!("{}.json", token)).exists());

    // A tiny size limit evicts the remaining preview
    runner.expect_success(&["cleanup", "--max-bytes", "1"]);
    assert!(!ws.staging_dir.join(format!("{}.json", token)).exists());
    assert!(runner.expect_failure(&["cleanup", "--stats", "--dry-run"]).to_string().contains("cannot be used"));
}

#[test]
fn test_feature_matching_prefers_earliest_symptom() {
    let fixture = TestFixture::new().unwrap();
    let db = fixture.database().unwrap();
    let store = TaxonomyStore::new(&db);
    let (continence, _) = store.create_category("Continence").unwrap();
    let (mobility, _) = store.create_category("Mobility").unwrap();
    store.add_symptom("Urinary incontinence", Some(continence.id)).unwrap();
    store.add_symptom("urinary-incontinence", Some(mobility.id)).unwrap();
    store.add_symptom("Falls", Some(mobility.id)).unwrap();
    store.add_symptom("Poor appetite", None).unwrap();

    let matcher = FeatureMatcher::from_store(&store, "RF_").unwrap();
    let report = matcher.match_features(&[
        "RF_Urinary_Incontinence",
        "rf_falls",
        "RF_Poor_Appetite",
        "RF_Unknown_Feature",
        "Age",
    ]);

    let symptoms: Vec<&str> = report.matched.iter().map(|m| m.symptom.as_str()).collect();
    assert_eq!(symptoms, vec!["Urinary incontinence", "Falls", "Poor appetite"]);
    assert_eq!(report.matched[0].category_id, Some(continence.id));
    assert_eq!(report.unmatched, vec!["RF_Unknown_Feature", "Age"]);
    assert_eq!(report.shadowed.len(), 1);
    assert_eq!(report.shadowed[0].winner, "Urinary incontinence");
    assert_eq!(report.shadowed[0].shadowed, vec!["urinary-incontinence"]);

    let groups = report.grouped_by_category();
    let names: Vec<&str> = groups.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Continence", "Mobility", UNCATEGORIZED]);
}

#[test]
fn test_prefixed_feature_matches_regardless_of_case() {
    let fixture = TestFixture::new().unwrap();
    let db = fixture.database().unwrap();
    let store = TaxonomyStore::new(&db);
    store.add_symptom("Urinary Incontinence", None).unwrap();

    let matcher = FeatureMatcher::from_store(&store, "RF_").unwrap();
    let report = matcher.match_features(&["RF_Urinary_Incontinence", "rf_URINARY.incontinence"]);

    assert_eq!(report.matched.len(), 2);
    assert!(report.matched.iter().all(|m| m.symptom == "Urinary Incontinence"));
    assert_eq!(report.matched[0].normalized, "urinary incontinence");
    assert!(report.shadowed.is_empty());
}

#[test]
fn test_shadow_winner_survives_rename() {
    let fixture = TestFixture::new().unwrap();
    let db = fixture.database().unwrap();
    let store = TaxonomyStore::new(&db);
    store.add_symptom("Low mood", None).unwrap();
    store.add_symptom("Depression", None).unwrap();

    // Renaming the later symptom onto the same key does not make it win
    store.rename("Depression", "low_mood").unwrap();
    let matcher = FeatureMatcher::from_store(&store, "RF_").unwrap();

    assert_eq!(matcher.lookup("RF_LOW_MOOD").map(|s| s.name.as_str()), Some("Low mood"));
}

#[test]
fn test_feature_lists_from_files() {
    let fixture = TestFixture::new().unwrap();
    let text = fixture
        .create_csv_raw("model.txt", "# exported features\nRF_Falls\n\n  RF_Pain  \n")
        .unwrap();
    let header = fixture
        .create_csv_raw("training.csv", "PersonID,RF_Falls,Age,rf_Pain\n1,0,80,1\n")
        .unwrap();
    let empty = fixture.create_csv_raw("empty.txt", "# nothing here\n").unwrap();

    assert_eq!(read_feature_list(&text, "RF_").unwrap(), vec!["RF_Falls", "RF_Pain"]);
    assert_eq!(read_feature_list(&header, "RF_").unwrap(), vec!["RF_Falls", "rf_Pain"]);
    assert!(matches!(
        read_feature_list(&empty, "RF_"),
        Err(CaretabError::InvalidInput { .. })
    ));
}

#[test]
fn test_cli_features_command() {
    let runner = CliTestRunner::new().unwrap();
    runner.expect_success(&["category", "add", "Mobility"]);
    let id = category_id(&runner, "Mobility").to_string();
    runner.expect_success(&["symptom", "add", "Falls", "--category-id", &id]);
    let features = runner
        .fixture()
        .create_csv_raw("features.txt", "RF_Falls\nRF_Pain\n")
        .unwrap();
    let custom = runner.fixture().create_csv_raw("custom.txt", "X_falls\n").unwrap();

    runner.expect_success(&["features", features.to_str().unwrap()]);
    runner.expect_success(&["features", features.to_str().unwrap(), "--format", "json"]);
    runner.expect_success(&["features", custom.to_str().unwrap(), "--prefix", "X_"]);
}

#[test]
fn test_workspace_flag_points_elsewhere() {
    let runner = CliTestRunner::new().unwrap();
    let other = TestFixture::new().unwrap();
    let other_root = other.root().to_str().unwrap().to_string();

    runner.expect_success(&["category", "add", "Elsewhere", "--workspace", &other_root]);

    let db = other.database().unwrap();
    assert_eq!(TaxonomyStore::new(&db).list_categories().unwrap().len(), 1);
    drop(db);
    let here = runner.fixture().database().unwrap();
    assert!(TaxonomyStore::new(&here).list_categories().unwrap().is_empty());
}

#[test]
fn test_records_file_round_through_preview_rows() {
    let fixture = TestFixture::new().unwrap();
    let csv = sample_data::records_with_risks(&["Falls"]);
    let file = fixture.create_csv_raw("one.csv", &csv).unwrap();
    let db = fixture.database().unwrap();

    let preview = fixture.preview_cache().unwrap().preview_file(&db, &file).unwrap();

    assert_eq!(preview.csv_columns.join(","), sample_data::HEADER);
    assert_eq!(preview.preview_rows.len(), 1);
    assert_eq!(preview.expected_columns.len(), 9);
}
