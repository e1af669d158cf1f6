//! # caretab
//!
//! Ingestion of caregiver health records from delimited uploads, with a
//! two-phase preview/commit flow, and upkeep of the risk-factor taxonomy
//! mined from their free-text fields.

pub mod change_detection;
pub mod cli;
pub mod commands;
pub mod commit;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod normalize;
pub mod output;
pub mod preview;
pub mod progress;
pub mod reconcile;
pub mod schema;
pub mod storage;
pub mod taxonomy;
pub mod values;
pub mod workspace;

pub use commit::{CommitEngine, CommitReport, CommitRequest, ImportMode};
pub use config::CaretabConfig;
pub use error::{CaretabError, Result};
pub use preview::{PreviewCache, PreviewResponse, PreviewSettings, PurgeOptions};
pub use reconcile::{Reconciler, ScanReport};
pub use schema::{match_columns, CanonicalSchema, ColumnMatchResult};
pub use storage::Database;
pub use taxonomy::TaxonomyStore;
pub use workspace::CaretabWorkspace;

/// Current format version for caretab files
pub const FORMAT_VERSION: &str = "1.0.0";

/// Default ceiling on upload size (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Default lifetime of a preview token (24 hours)
pub const DEFAULT_PREVIEW_TTL_SECS: u64 = 24 * 3600;

/// Default ceiling on the staging directory before cleanup evicts old previews (500 MiB)
pub const DEFAULT_MAX_STAGING_BYTES: u64 = 500 * 1024 * 1024;

/// Default number of rows shown in a preview
pub const DEFAULT_PREVIEW_ROWS: usize = 20;

/// Default free-text column mined by the reconciler
pub const DEFAULT_RISK_COLUMN: &str = "M-Risk Factors";

/// Default prefix of model feature identifiers
pub const DEFAULT_FEATURE_PREFIX: &str = "RF_";
