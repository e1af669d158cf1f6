//! Output formatting utilities

use crate::change_detection::WorklistChanges;
use crate::commit::CommitReport;
use crate::error::Result;
use crate::features::FeatureMatchReport;
use crate::preview::{PreviewResponse, PurgeReport, StagingStats};
use crate::reconcile::{Classification, ScanReport};
use crate::storage::RecordStats;
use crate::taxonomy::{BulkReport, Category, CategoryDeletion, ItemStatus, Symptom};

/// Pretty printer for caretab output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the preview of an upload
    pub fn print_preview(preview: &PreviewResponse) {
        println!("📄 Preview: {}", preview.filename);
        println!("├─ Token: {}", preview.token);
        println!("├─ Rows: {}", preview.total_rows);
        println!("├─ Expires: {}", preview.expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("├─ Columns:");
        let count = preview.expected_columns.len();
        for (i, expected) in preview.expected_columns.iter().enumerate() {
            let prefix = if i == count - 1 { "│  └─" } else { "│  ├─" };
            match preview.csv_to_expected.get(expected).and_then(|c| c.as_deref()) {
                Some(csv) if csv == expected => println!("{} ✅ {}", prefix, expected),
                Some(csv) => println!("{} ✅ {} ← '{}'", prefix, expected, csv),
                None => println!("{} ❌ {} (missing from file)", prefix, expected),
            }
        }
        if !preview.missing_in_db.is_empty() {
            println!("├─ ⚠️  Not stored: {}", preview.missing_in_db.join(", "));
        }
        if !preview.duplicate_columns.is_empty() {
            println!("├─ ⚠️  Duplicate headers ignored: {}", preview.duplicate_columns.join(", "));
        }
        if preview.can_import {
            println!("└─ ✅ Ready to commit");
        } else {
            println!("└─ ❌ Cannot import: missing {}", preview.missing_in_csv.join(", "));
        }

        if !preview.preview_rows.is_empty() {
            println!();
            println!("{}", preview.csv_columns.join(" | "));
            for row in &preview.preview_rows {
                let cells: Vec<&str> = row.values().map(String::as_str).collect();
                println!("{}", cells.join(" | "));
            }
            if preview.total_rows > preview.preview_rows.len() {
                println!("... {} more rows", preview.total_rows - preview.preview_rows.len());
            }
        }
    }

    pub fn print_commit_report(report: &CommitReport) {
        println!("💾 Commit ({})", report.mode);
        if let Some(replaced) = report.replaced {
            println!("├─ Replaced: {} rows", replaced);
        }
        println!("├─ Inserted: {} rows", report.inserted);
        println!("└─ Rows in file: {}", report.total_rows_in_file);
    }

    pub fn print_categories(categories: &[Category]) {
        if categories.is_empty() {
            println!("No categories found.");
            return;
        }

        println!("🗂️  Categories:");
        for (i, category) in categories.iter().enumerate() {
            let prefix = if i == categories.len() - 1 { "└─" } else { "├─" };
            println!("{} [{}] {}", prefix, category.id, category.name);
        }
    }

    pub fn print_category_deletion(id: i64, deletion: &CategoryDeletion) {
        if deletion.deleted {
            println!("🗑️  Deleted category {}", id);
            println!("└─ Symptoms unassigned: {}", deletion.affected_symptoms_set_null);
        } else {
            println!("Category {} not found; nothing deleted.", id);
        }
    }

    pub fn print_symptoms(symptoms: &[Symptom]) {
        if symptoms.is_empty() {
            println!("No symptoms found.");
            return;
        }

        println!("🩺 Symptoms ({}):", symptoms.len());
        for (i, symptom) in symptoms.iter().enumerate() {
            let prefix = if i == symptoms.len() - 1 { "└─" } else { "├─" };
            match &symptom.category {
                Some(category) => println!("{} {} → {}", prefix, symptom.name, category),
                None => println!("{} {} (unassigned)", prefix, symptom.name),
            }
        }
    }

    pub fn print_bulk_report(title: &str, report: &BulkReport) {
        println!("📋 {}: {} applied, {} not applied", title, report.succeeded(), report.failed());
        for (i, outcome) in report.outcomes.iter().enumerate() {
            let prefix = if i == report.outcomes.len() - 1 { "└─" } else { "├─" };
            let marker = if outcome.status.is_success() { "✅" } else { "❌" };
            match &outcome.message {
                Some(message) => println!(
                    "{} {} {}: {} ({})",
                    prefix,
                    marker,
                    outcome.symptom,
                    status_label(outcome.status),
                    message
                ),
                None => println!("{} {} {}: {}", prefix, marker, outcome.symptom, status_label(outcome.status)),
            }
        }
    }

    /// Print a scan worklist
    pub fn print_scan_report(report: &ScanReport) {
        println!("🔍 Scan of '{}'", report.column);
        println!("├─ Records scanned: {}", report.records_scanned);
        println!("├─ Distinct terms: {}", report.distinct_terms);
        println!(
            "├─ Uncategorized: {}",
            report.count(Classification::ExistingNull)
        );
        println!("├─ New: {}", report.count(Classification::New));

        if !report.format_issues.is_empty() {
            println!("├─ ⚠️  Values with non-standard commas: {}", report.format_issues.len());
            for issue in &report.format_issues {
                println!("│  └─ '{}' ({} records)", issue.value, issue.records);
            }
        }

        if report.missing_items.is_empty() {
            println!("└─ ✅ Every term is categorized");
            return;
        }
        println!("└─ Worklist:");
        for (i, item) in report.missing_items.iter().enumerate() {
            let prefix = if i == report.missing_items.len() - 1 { "   └─" } else { "   ├─" };
            let label = match item.classification {
                Classification::ExistingNull => "uncategorized",
                Classification::New => "new",
            };
            println!("{} {} [{}]", prefix, item.symptom, label);
        }
    }

    pub fn print_worklist_changes(changes: &WorklistChanges) {
        if !changes.has_changes() {
            return;
        }
        println!("🔄 Worklist changed");
        if !changes.added.is_empty() {
            println!("├─ Added: {}", changes.added.join(", "));
        }
        println!("└─ Removed: {}", if changes.removed.is_empty() { "none".to_string() } else { changes.removed.join(", ") });
    }

    pub fn print_feature_report(report: &FeatureMatchReport) {
        println!("🧩 Features: {} matched, {} unmatched", report.matched.len(), report.unmatched.len());
        for (category, matches) in report.grouped_by_category() {
            println!("├─ {}", category);
            for (i, m) in matches.iter().enumerate() {
                let prefix = if i == matches.len() - 1 { "│  └─" } else { "│  ├─" };
                println!("{} {} → {}", prefix, m.feature, m.symptom);
            }
        }
        for shadow in &report.shadowed {
            println!("├─ ⚠️  '{}' shadows {}", shadow.winner, shadow.shadowed.join(", "));
        }
        if report.unmatched.is_empty() {
            println!("└─ ✅ All features matched");
        } else {
            println!("└─ Unmatched: {}", report.unmatched.join(", "));
        }
    }

    pub fn print_stats(stats: &RecordStats) {
        println!("📊 Caretab Records");
        println!("├─ Rows: {}", stats.total_rows);
        println!("└─ People: {}", stats.unique_persons);
    }

    pub fn print_purge_report(report: &PurgeReport) {
        let (title, verb) = if report.dry_run {
            ("🧹 Cleanup (dry run)", "would be removed")
        } else {
            ("🧹 Cleanup", "removed")
        };
        println!("{}", title);
        println!("├─ Cached previews {}: {}", verb, report.entries_removed);
        println!("├─ Staged files {}: {}", verb, report.files_removed);
        if report.evicted_for_size > 0 {
            println!("├─ Over the size limit: {}", report.evicted_for_size);
        }
        for name in &report.files {
            println!("│  • {}", name);
        }
        println!("└─ Space freed: {}", format_bytes(report.bytes_freed));
    }

    pub fn print_staging_stats(stats: &StagingStats) {
        println!("📦 Staging area");
        println!("├─ Files: {} ({})", stats.total_files, format_bytes(stats.total_bytes));
        println!("├─ Staged previews: {}", stats.staged_previews);
        println!("├─ Expired previews: {}", stats.expired_previews);
        match stats.oldest_file_age_secs {
            Some(secs) => println!("└─ Oldest file: {:.1} hours old", secs as f64 / 3600.0),
            None => println!("└─ Oldest file: none"),
        }
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    /// Format a scan together with what changed since the last one shown
    pub fn format_scan(report: &ScanReport, changes: Option<&WorklistChanges>) -> Result<String> {
        let json = serde_json::json!({
            "report": report,
            "changes": changes,
        });
        Ok(serde_json::to_string_pretty(&json)?)
    }

    pub fn format_feature_report(report: &FeatureMatchReport) -> Result<String> {
        let json = serde_json::json!({
            "matched": report.matched,
            "unmatched": report.unmatched,
            "shadowed": report.shadowed,
            "groups": report.grouped_by_category(),
        });
        Ok(serde_json::to_string_pretty(&json)?)
    }
}

fn status_label(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Inserted => "inserted",
        ItemStatus::Updated => "updated",
        ItemStatus::Unchanged => "unchanged",
        ItemStatus::AlreadyExists => "already exists",
        ItemStatus::NotFound => "not found",
        ItemStatus::InvalidCategory => "invalid category",
        ItemStatus::CategoryRequired => "category required",
        ItemStatus::Invalid => "invalid",
        ItemStatus::Failed => "failed",
    }
}

/// Format bytes in human-readable format
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
