//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Rows written between progress bar refreshes
const ROW_REPORT_INTERVAL: u64 = 500;

/// Progress reporter for commits and scans
#[derive(Debug)]
pub struct ProgressReporter {
    pub stage_pb: Option<ProgressBar>,
    pub rows_pb: Option<ProgressBar>,
    total_rows: u64,
    show_progress: bool,
}

impl ProgressReporter {
    /// Create progress reporter for a commit of `total_rows` rows
    pub fn new_for_commit(total_rows: u64) -> Self {
        Self {
            stage_pb: Some(create_spinner("Checking out preview...")),
            rows_pb: None,
            total_rows,
            show_progress: true,
        }
    }

    /// Create progress reporter for a taxonomy scan
    pub fn new_for_scan() -> Self {
        Self {
            stage_pb: Some(create_spinner("Reading stored records...")),
            rows_pb: None,
            total_rows: 0,
            show_progress: true,
        }
    }

    /// Create minimal progress reporter (no progress bars)
    pub fn new_minimal() -> Self {
        Self {
            stage_pb: None,
            rows_pb: None,
            total_rows: 0,
            show_progress: false,
        }
    }

    /// Total becomes known once the dataset is checked out
    pub fn set_total_rows(&mut self, total_rows: u64) {
        self.total_rows = total_rows;
        if let Some(pb) = &self.rows_pb {
            pb.set_length(total_rows);
        }
    }

    fn ensure_rows_pb(&mut self) {
        if self.show_progress && self.rows_pb.is_none() {
            self.rows_pb = Some(create_progress_bar(self.total_rows, "Writing rows"));
        }
    }

    pub fn finish_stage(&mut self, message: &str) {
        if let Some(pb) = self.stage_pb.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    /// Update row progress; the bar is only redrawn every few hundred rows
    pub fn update_rows(&mut self, processed: u64) {
        if processed % ROW_REPORT_INTERVAL != 0 && processed != self.total_rows {
            return;
        }
        self.ensure_rows_pb();
        if let Some(pb) = &self.rows_pb {
            pb.set_position(processed);
        }
    }

    pub fn finish_rows(&mut self, message: &str) {
        if let Some(pb) = self.rows_pb.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Ensure all progress bars are cleaned up silently
        if let Some(pb) = self.stage_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = self.rows_pb.take() {
            pb.finish_and_clear();
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Create a spinner progress bar
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a progress bar with known total
fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({per_sec}) {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}
