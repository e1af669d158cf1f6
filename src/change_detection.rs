//! Worklist change detection between successive scans

use crate::error::Result;
use crate::reconcile::{Reconciler, ScanReport};
use crate::schema::CanonicalSchema;
use crate::storage::Database;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;

/// Keys that entered or left the worklist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorklistChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl WorklistChanges {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

/// A worklist changed when its size differs or any key is in only one of the
/// two sets.
pub fn worklist_changed(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> bool {
    previous.len() != current.len() || previous.symmetric_difference(current).next().is_some()
}

/// Added and removed keys, each sorted
pub fn diff_keys(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> WorklistChanges {
    WorklistChanges {
        added: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}

/// Holds the report on display and swaps it only when the worklist changed
#[derive(Debug, Default)]
pub struct WorklistWatcher {
    current: Option<ScanReport>,
}

impl WorklistWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The report currently shown
    pub fn current(&self) -> Option<&ScanReport> {
        self.current.as_ref()
    }

    /// Offer a fresh scan. Returns the changes when the worklist moved (the
    /// first scan always counts); otherwise the previous report is kept.
    pub fn observe(&mut self, report: ScanReport) -> Option<WorklistChanges> {
        let next = report.keys();
        let changes = match &self.current {
            Some(shown) => {
                let previous = shown.keys();
                if !worklist_changed(&previous, &next) {
                    log::debug!("Worklist unchanged ({} items)", next.len());
                    return None;
                }
                diff_keys(&previous, &next)
            }
            None => diff_keys(&BTreeSet::new(), &next),
        };

        log::info!(
            "Worklist changed: {} added, {} removed",
            changes.added.len(),
            changes.removed.len()
        );
        self.current = Some(report);
        Some(changes)
    }
}

/// How often and how long to poll
#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    pub interval: Duration,
    /// Stop after this many scans; `None` polls until the callback breaks
    pub max_polls: Option<usize>,
}

/// Poll the worklist of the database at `db_path`, calling `on_change` with
/// the new report whenever the worklist moves.
///
/// The database is opened for each scan and closed again before sleeping, so
/// other processes can commit and resolve between polls. A poll that cannot
/// open the database (another process holds the lock) is skipped.
pub fn watch_worklist<F>(
    db_path: &Path,
    schema: &CanonicalSchema,
    column: &str,
    settings: WatchSettings,
    mut on_change: F,
) -> Result<WorklistWatcher>
where
    F: FnMut(&ScanReport, &WorklistChanges) -> Result<ControlFlow<()>>,
{
    let mut watcher = WorklistWatcher::new();
    let mut polls = 0usize;

    loop {
        polls += 1;
        match Database::open(db_path, schema) {
            Ok(db) => {
                let report = Reconciler::new(&db).scan(column)?;
                drop(db);
                if let Some(changes) = watcher.observe(report) {
                    if let Some(current) = watcher.current() {
                        if on_change(current, &changes)?.is_break() {
                            break;
                        }
                    }
                }
            }
            Err(e) => log::warn!("Skipping poll {}: {}", polls, e),
        }

        if settings.max_polls.is_some_and(|max| polls >= max) {
            break;
        }
        std::thread::sleep(settings.interval);
    }

    Ok(watcher)
}
