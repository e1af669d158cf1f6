//! Command-line interface for caretab

use crate::commit::ImportMode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "caretab")]
#[command(about = "Caregiver record ingestion and risk-factor taxonomy upkeep")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override workspace location
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format: "pretty", "json"
    #[arg(long, global = true, default_value = "pretty", value_parser = OutputFormat::parse)]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize caretab workspace
    Init {
        /// Rewrite the configuration even if the workspace exists
        #[arg(long)]
        force: bool,
    },

    /// Parse an upload and issue a commit token
    Preview {
        /// Delimited file to import
        file: PathBuf,
    },

    /// Write a previewed upload to the records table
    Commit {
        /// Token printed by `preview`
        token: String,

        /// Append to or replace the stored records
        #[arg(long, value_enum, default_value_t = ImportMode::Append)]
        mode: ImportMode,

        /// Confirm that overwrite may delete every stored record
        #[arg(long)]
        confirm: bool,
    },

    /// Manage categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Manage symptoms
    Symptom {
        #[command(subcommand)]
        action: SymptomAction,
    },

    /// Find risk-factor terms that are missing or uncategorized
    Scan {
        /// Stored column holding comma-separated terms (defaults to the configured risk column)
        #[arg(long)]
        column: Option<String>,

        /// Re-scan every N seconds and report only when the worklist changes
        #[arg(long, value_parser = validate_interval)]
        watch: Option<u64>,

        /// Stop watching after N scans
        #[arg(long, requires = "watch")]
        polls: Option<usize>,
    },

    /// Resolve worklist items by giving them a category
    Resolve(ResolveArgs),

    /// Match model feature identifiers to symptoms
    Features {
        /// Text file (one identifier per line) or CSV whose header carries the features
        file: PathBuf,

        /// Feature prefix to strip (defaults to the configured prefix)
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Show record statistics
    Stats,

    /// Remove expired previews from the staging area
    Cleanup {
        /// List what would be removed without removing it
        #[arg(long)]
        dry_run: bool,

        /// Show what the staging area holds instead of cleaning it
        #[arg(long, conflicts_with_all = ["dry_run", "max_bytes"])]
        stats: bool,

        /// Evict the oldest previews above this many bytes (defaults to the configured limit)
        #[arg(long)]
        max_bytes: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum CategoryAction {
    /// List categories alphabetically
    List,
    /// Create a category (returns the existing one on a name match)
    Add { name: String },
    /// Rename a category
    Rename { id: i64, name: String },
    /// Delete a category; its symptoms become unassigned
    Delete { id: i64 },
}

#[derive(Subcommand)]
pub enum SymptomAction {
    /// List symptoms
    List {
        /// Case-insensitive substring filter
        #[arg(long)]
        search: Option<String>,

        /// Only symptoms in this category
        #[arg(long, conflicts_with = "unassigned")]
        category_id: Option<i64>,

        /// Only symptoms without a category
        #[arg(long)]
        unassigned: bool,
    },
    /// Register a symptom
    Add {
        name: String,
        #[arg(long)]
        category_id: Option<i64>,
    },
    /// Set or clear the category of a symptom
    Assign {
        name: String,
        /// Omit to clear the category
        #[arg(long)]
        category_id: Option<i64>,
    },
    /// Rename a symptom, keeping its category
    Rename { old: String, new: String },
    /// Delete a symptom
    Delete { name: String },
    /// Insert symptoms from a JSON array of {"symptom", "category_id"}
    InsertMany { file: PathBuf },
    /// Update categories from a JSON array of {"symptom", "category_id"}
    UpdateMany { file: PathBuf },
}

#[derive(Args)]
#[command(group = clap::ArgGroup::new("source").required(true).args(["file", "symptom"]))]
pub struct ResolveArgs {
    /// JSON array of {"symptom", "category_id"}
    pub file: Option<PathBuf>,

    /// Resolve a single symptom
    #[arg(long, requires = "category_id")]
    pub symptom: Option<String>,

    /// Category for --symptom
    #[arg(long)]
    pub category_id: Option<i64>,
}

/// Parse output format string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}

/// Validate that the watch interval is greater than 0
fn validate_interval(s: &str) -> Result<u64, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("Invalid interval: '{}'. Must be a positive integer.", s))?;

    if secs == 0 {
        return Err("Watch interval must be greater than 0".to_string());
    }

    Ok(secs)
}
