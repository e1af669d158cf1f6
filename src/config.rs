//! Workspace configuration with environment overrides

use crate::error::{CaretabError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const ENV_MAX_UPLOAD_BYTES: &str = "CARETAB_MAX_UPLOAD_BYTES";
pub const ENV_PREVIEW_TTL_SECS: &str = "CARETAB_PREVIEW_TTL_SECS";

/// Longest preview lifetime accepted (one year)
const MAX_PREVIEW_TTL_SECS: u64 = 365 * 24 * 3600;

/// Settings stored in `.caretab/config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaretabConfig {
    pub format_version: String,
    pub created: Option<DateTime<Utc>>,
    /// Uploads larger than this are rejected before parsing
    pub max_upload_bytes: u64,
    pub preview_ttl_secs: u64,
    pub preview_row_limit: usize,
    /// `cleanup` evicts the oldest staged previews above this size
    pub max_staging_bytes: u64,
    /// Multi-value free-text field mined by `scan`
    pub risk_column: String,
    /// Prefix stripped from model feature identifiers
    pub feature_prefix: String,
}

impl Default for CaretabConfig {
    fn default() -> Self {
        Self {
            format_version: crate::FORMAT_VERSION.to_string(),
            created: None,
            max_upload_bytes: crate::DEFAULT_MAX_UPLOAD_BYTES,
            preview_ttl_secs: crate::DEFAULT_PREVIEW_TTL_SECS,
            preview_row_limit: crate::DEFAULT_PREVIEW_ROWS,
            max_staging_bytes: crate::DEFAULT_MAX_STAGING_BYTES,
            risk_column: crate::DEFAULT_RISK_COLUMN.to_string(),
            feature_prefix: crate::DEFAULT_FEATURE_PREFIX.to_string(),
        }
    }
}

impl CaretabConfig {
    /// Load configuration from `path` (defaults when absent) and apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content).map_err(|e| {
                CaretabError::config(format!("Invalid config file '{}': {}", path.display(), e))
            })?
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_MAX_UPLOAD_BYTES) {
            self.max_upload_bytes = parse_u64(ENV_MAX_UPLOAD_BYTES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PREVIEW_TTL_SECS) {
            self.preview_ttl_secs = parse_u64(ENV_PREVIEW_TTL_SECS, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(CaretabError::config("max_upload_bytes must be greater than 0"));
        }
        if self.preview_ttl_secs == 0 || self.preview_ttl_secs > MAX_PREVIEW_TTL_SECS {
            return Err(CaretabError::config(format!(
                "preview_ttl_secs must be between 1 and {}",
                MAX_PREVIEW_TTL_SECS
            )));
        }
        if self.max_staging_bytes == 0 {
            return Err(CaretabError::config("max_staging_bytes must be greater than 0"));
        }
        if self.risk_column.trim().is_empty() {
            return Err(CaretabError::config("risk_column must not be empty"));
        }
        Ok(())
    }

    /// Write the configuration; an existing file is kept unless `force`.
    /// Returns whether the file was written.
    pub fn save(&self, path: &Path, force: bool) -> Result<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(true)
    }

    pub fn preview_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.preview_ttl_secs.min(MAX_PREVIEW_TTL_SECS) as i64)
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| CaretabError::config(format!("{} must be a positive integer, got '{}'", key, raw)))
}
