//! Error types for caretab operations

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CaretabError>;

/// Why a preview token was refused at commit time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Unknown,
    Expired,
    Consumed,
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown token"),
            Self::Expired => write!(f, "token expired"),
            Self::Consumed => write!(f, "token already used"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CaretabError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Failed to parse '{filename}': {message}")]
    ParseFailure { filename: String, message: String },

    #[error("Invalid or expired token '{token}' ({reason}); preview the file again")]
    TokenInvalid { token: String, reason: TokenRejection },

    #[error("File is missing required columns: {}", missing.join(", "))]
    SchemaIncomplete { missing: Vec<String> },

    #[error("Overwrite replaces every stored record and must be explicitly confirmed")]
    ConfirmationRequired,

    #[error("Symptom already exists: {name}")]
    DuplicateSymptom { name: String },

    #[error("Category already exists: {name}")]
    DuplicateCategory { name: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("A category must be selected before resolving '{symptom}'")]
    CategoryRequired { symptom: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),
}

impl CaretabError {
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn parse_failure(filename: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ParseFailure {
            filename: filename.into(),
            message: msg.into(),
        }
    }

    pub fn token_invalid(token: impl Into<String>, reason: TokenRejection) -> Self {
        Self::TokenInvalid {
            token: token.into(),
            reason,
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Poisoned locks surface as storage errors rather than panics
    pub(crate) fn poisoned(what: &str) -> Self {
        Self::storage(format!("{} lock poisoned by a panicked writer", what))
    }
}
