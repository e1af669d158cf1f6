//! Command implementations for caretab CLI

use crate::change_detection::{watch_worklist, WatchSettings};
use crate::cli::{CategoryAction, Commands, OutputFormat, ResolveArgs, SymptomAction};
use crate::commit::{CommitEngine, CommitRequest, ImportMode};
use crate::config::CaretabConfig;
use crate::error::Result;
use crate::features::{read_feature_list, FeatureMatcher};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::preview::{PreviewCache, PreviewSettings, PurgeOptions};
use crate::progress::ProgressReporter;
use crate::reconcile::Reconciler;
use crate::schema::CanonicalSchema;
use crate::storage::Database;
use crate::taxonomy::{BulkReport, MutationOutcome, SymptomAssignment, SymptomQuery, TaxonomyStore};
use crate::workspace::CaretabWorkspace;
use serde::Serialize;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;

/// Execute a command
pub fn execute_command(command: Commands, workspace_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Init { force } => init_command(workspace_path, force),
        Commands::Preview { file } => preview_command(&Session::open(workspace_path, format)?, &file),
        Commands::Commit { token, mode, confirm } => {
            commit_command(&Session::open(workspace_path, format)?, &token, mode, confirm)
        }
        Commands::Category { action } => category_command(&Session::open(workspace_path, format)?, action),
        Commands::Symptom { action } => symptom_command(&Session::open(workspace_path, format)?, action),
        Commands::Scan {
            column,
            watch: Some(interval),
            polls,
        } => watch_command(workspace_path, format, column.as_deref(), interval, polls),
        Commands::Scan { column, watch: None, .. } => {
            scan_command(&Session::open(workspace_path, format)?, column.as_deref())
        }
        Commands::Resolve(args) => resolve_command(&Session::open(workspace_path, format)?, args),
        Commands::Features { file, prefix } => {
            features_command(&Session::open(workspace_path, format)?, &file, prefix.as_deref())
        }
        Commands::Stats => stats_command(&Session::open(workspace_path, format)?),
        Commands::Cleanup {
            dry_run,
            stats,
            max_bytes,
        } => cleanup_command(&Session::open(workspace_path, format)?, dry_run, stats, max_bytes),
    }
}

/// Everything a command needs from the workspace
struct Session {
    workspace: CaretabWorkspace,
    config: CaretabConfig,
    db: Database,
    format: OutputFormat,
}

impl Session {
    fn open(workspace_path: Option<&Path>, format: OutputFormat) -> Result<Self> {
        let workspace = CaretabWorkspace::find_or_create(workspace_path)?;
        let config = workspace.load_config()?;
        let db = Database::open(&workspace.database_path(), &CanonicalSchema::caregiver_records())?;
        Ok(Self {
            workspace,
            config,
            db,
            format,
        })
    }

    fn preview_cache(&self) -> Result<PreviewCache> {
        PreviewCache::with_staging(&self.workspace.staging_dir, PreviewSettings::from_config(&self.config))
    }

    fn taxonomy(&self) -> TaxonomyStore<'_> {
        TaxonomyStore::new(&self.db)
    }

    /// Print `value` as JSON or through the pretty printer
    fn emit<T: Serialize + ?Sized>(&self, value: &T, pretty: impl FnOnce(&T)) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", JsonFormatter::format(value)?),
            OutputFormat::Pretty => pretty(value),
        }
        Ok(())
    }
}

/// Initialize caretab workspace
fn init_command(workspace_path: Option<&Path>, force: bool) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let root = workspace_path.unwrap_or(&current_dir);

    // Always initialize in the given directory rather than a parent workspace
    let workspace = CaretabWorkspace::from_root(root.to_path_buf());
    workspace.initialize(force)?;
    Database::open(&workspace.database_path(), &CanonicalSchema::caregiver_records())?;

    println!("✅ Initialized caretab workspace at: {}", workspace.root.display());
    println!("📁 Workspace directory: {}", workspace.caretab_dir.display());
    Ok(())
}

fn preview_command(session: &Session, file: &Path) -> Result<()> {
    let cache = session.preview_cache()?;
    let preview = cache.preview_file(&session.db, file)?;
    session.emit(&preview, PrettyPrinter::print_preview)?;

    if session.format == OutputFormat::Pretty && preview.can_import {
        println!();
        println!("Commit with: caretab commit {} --mode append", preview.token);
    }
    Ok(())
}

fn commit_command(session: &Session, token: &str, mode: ImportMode, confirm: bool) -> Result<()> {
    let cache = session.preview_cache()?;
    let engine = CommitEngine::new(&session.db, &cache);
    let request = CommitRequest {
        token: token.to_string(),
        mode,
        confirmed: confirm,
    };

    let report = if session.format == OutputFormat::Pretty {
        let mut progress = ProgressReporter::new_for_commit(0);
        engine.commit_with_progress(&request, &mut progress)?
    } else {
        engine.commit(&request)?
    };
    session.emit(&report, PrettyPrinter::print_commit_report)
}

fn category_command(session: &Session, action: CategoryAction) -> Result<()> {
    let store = session.taxonomy();
    match action {
        CategoryAction::List => session.emit(&store.list_categories()?, |c| PrettyPrinter::print_categories(c)),
        CategoryAction::Add { name } => {
            let (category, created) = store.create_category(&name)?;
            session.emit(
                &serde_json::json!({ "category": category, "created": created }),
                |_| {
                    if created {
                        println!("✅ Created category [{}] {}", category.id, category.name);
                    } else {
                        println!("ℹ️  Category already exists: [{}] {}", category.id, category.name);
                    }
                },
            )
        }
        CategoryAction::Rename { id, name } => {
            let category = store.rename_category(id, &name)?;
            session.emit(&category, |c| println!("✅ Renamed category [{}] to {}", c.id, c.name))
        }
        CategoryAction::Delete { id } => {
            let deletion = store.delete_category(id)?;
            session.emit(&deletion, |d| PrettyPrinter::print_category_deletion(id, d))
        }
    }
}

fn symptom_command(session: &Session, action: SymptomAction) -> Result<()> {
    let store = session.taxonomy();
    match action {
        SymptomAction::List {
            search,
            category_id,
            unassigned,
        } => {
            let query = SymptomQuery {
                search,
                category_id,
                unassigned_only: unassigned,
            };
            session.emit(&store.list_symptoms(&query)?, |s| PrettyPrinter::print_symptoms(s))
        }
        SymptomAction::Add { name, category_id } => {
            let symptom = store.add_symptom(&name, category_id)?;
            session.emit(&symptom, |s| println!("✅ Registered symptom '{}'", s.name))
        }
        SymptomAction::Assign { name, category_id } => {
            let outcome = store.assign(&name, category_id)?;
            emit_outcome(session, &name, outcome)
        }
        SymptomAction::Rename { old, new } => {
            let outcome = store.rename(&old, &new)?;
            emit_outcome(session, &old, outcome)
        }
        SymptomAction::Delete { name } => {
            let deleted = store.delete(&name)?;
            session.emit(&serde_json::json!({ "symptom": name, "deleted": deleted }), |_| {
                if deleted {
                    println!("🗑️  Deleted symptom '{}'", name);
                } else {
                    println!("Symptom '{}' not found; nothing deleted.", name);
                }
            })
        }
        SymptomAction::InsertMany { file } => {
            let report = store.insert_many(&read_assignments(&file)?)?;
            emit_bulk(session, "Insert", &report)
        }
        SymptomAction::UpdateMany { file } => {
            let report = store.update_many(&read_assignments(&file)?)?;
            emit_bulk(session, "Update", &report)
        }
    }
}

fn emit_outcome(session: &Session, name: &str, outcome: MutationOutcome) -> Result<()> {
    session.emit(&serde_json::json!({ "symptom": name, "outcome": outcome }), |_| match outcome {
        MutationOutcome::Applied => println!("✅ Updated '{}'", name),
        MutationOutcome::Unchanged => println!("ℹ️  '{}' already up to date", name),
        MutationOutcome::NotFound => println!("❌ Symptom '{}' not found", name),
    })
}

fn emit_bulk(session: &Session, title: &str, report: &BulkReport) -> Result<()> {
    session.emit(report, |r| PrettyPrinter::print_bulk_report(title, r))
}

fn read_assignments(path: &Path) -> Result<Vec<SymptomAssignment>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn scan_command(session: &Session, column: Option<&str>) -> Result<()> {
    let column = column.unwrap_or(session.config.risk_column.as_str());
    let reconciler = Reconciler::new(&session.db);

    let report = {
        let mut progress = match session.format {
            OutputFormat::Pretty => ProgressReporter::new_for_scan(),
            OutputFormat::Json => ProgressReporter::new_minimal(),
        };
        let report = reconciler.scan(column)?;
        progress.finish_stage(&format!("Scanned {} records", report.records_scanned));
        report
    };
    session.emit(&report, PrettyPrinter::print_scan_report)
}

/// Poll the worklist without keeping the database open between scans
fn watch_command(
    workspace_path: Option<&Path>,
    format: OutputFormat,
    column: Option<&str>,
    interval: u64,
    polls: Option<usize>,
) -> Result<()> {
    let workspace = CaretabWorkspace::find_or_create(workspace_path)?;
    let config = workspace.load_config()?;
    let column = column.unwrap_or(config.risk_column.as_str());
    let settings = WatchSettings {
        interval: Duration::from_secs(interval),
        max_polls: polls,
    };

    log::info!("Watching '{}' every {}s; press Ctrl-C to stop", column, interval);
    watch_worklist(
        &workspace.database_path(),
        &CanonicalSchema::caregiver_records(),
        column,
        settings,
        |current, changes| {
            match format {
                OutputFormat::Json => println!("{}", JsonFormatter::format_scan(current, Some(changes))?),
                OutputFormat::Pretty => {
                    PrettyPrinter::print_worklist_changes(changes);
                    PrettyPrinter::print_scan_report(current);
                    println!();
                }
            }
            Ok(ControlFlow::Continue(()))
        },
    )?;
    Ok(())
}

fn resolve_command(session: &Session, args: ResolveArgs) -> Result<()> {
    let reconciler = Reconciler::new(&session.db);
    let report = match (args.file, args.symptom) {
        (Some(file), _) => reconciler.resolve_many(&read_assignments(&file)?)?,
        (None, Some(symptom)) => {
            // --symptom reports its error directly
            let item = SymptomAssignment::new(symptom, args.category_id);
            let status = reconciler.resolve(&item)?;
            let mut report = BulkReport::default();
            report.record(&item.symptom, Ok(status));
            report
        }
        (None, None) => BulkReport::default(),
    };
    emit_bulk(session, "Resolve", &report)
}

fn features_command(session: &Session, file: &Path, prefix: Option<&str>) -> Result<()> {
    let prefix = prefix.unwrap_or(session.config.feature_prefix.as_str());
    let features = read_feature_list(file, prefix)?;
    let matcher = FeatureMatcher::from_store(&session.taxonomy(), prefix)?;
    let report = matcher.match_features(&features);

    match session.format {
        OutputFormat::Json => println!("{}", JsonFormatter::format_feature_report(&report)?),
        OutputFormat::Pretty => PrettyPrinter::print_feature_report(&report),
    }
    Ok(())
}

fn stats_command(session: &Session) -> Result<()> {
    let stats = session.db.stats()?;
    session.emit(&stats, PrettyPrinter::print_stats)
}

fn cleanup_command(session: &Session, dry_run: bool, stats: bool, max_bytes: Option<u64>) -> Result<()> {
    let cache = session.preview_cache()?;
    if stats {
        return session.emit(&cache.staging_stats()?, PrettyPrinter::print_staging_stats);
    }

    let options = PurgeOptions {
        dry_run,
        max_staging_bytes: Some(max_bytes.unwrap_or(session.config.max_staging_bytes)),
    };
    let report = cache.purge(options)?;
    session.emit(&report, PrettyPrinter::print_purge_report)
}
