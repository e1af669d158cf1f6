//! Token-addressed cache of parsed uploads awaiting commit

use crate::config::CaretabConfig;
use crate::data::{DataProcessor, Record};
use crate::error::{CaretabError, Result, TokenRejection};
use crate::schema::{match_columns, ColumnMatchResult};
use crate::storage::{Database, RECORDS_TABLE};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

const STAGED_EXTENSION: &str = "json";
const CLAIM_MARKER: &str = ".claim-";

/// A parsed upload held until it is committed or expires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDataset {
    pub token: String,
    pub filename: String,
    pub total_rows: usize,
    /// Headers exactly as uploaded
    pub csv_columns: Vec<String>,
    pub rows: Vec<Record>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub column_match: ColumnMatchResult,
    /// blake3 of the uploaded bytes
    pub source_hash: String,
}

impl ParsedDataset {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Build the client-facing summary, showing at most `row_limit` rows
    pub fn to_response(&self, row_limit: usize) -> PreviewResponse {
        let m = &self.column_match;
        PreviewResponse {
            token: self.token.clone(),
            filename: self.filename.clone(),
            total_rows: self.total_rows,
            csv_columns: self.csv_columns.clone(),
            expected_columns: m.expected_columns.clone(),
            missing_in_csv: m.missing_in_csv.clone(),
            missing_in_db: m.missing_in_db.clone(),
            csv_to_expected: m.csv_to_expected.clone(),
            expected_to_db: m.expected_to_db.clone(),
            duplicate_columns: m.duplicate_columns.clone(),
            can_import: m.can_import,
            preview_rows: self.rows.iter().take(row_limit).cloned().collect(),
            source_hash: self.source_hash.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// What the admin reviews before committing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub token: String,
    pub filename: String,
    pub total_rows: usize,
    pub csv_columns: Vec<String>,
    pub expected_columns: Vec<String>,
    pub missing_in_csv: Vec<String>,
    pub missing_in_db: Vec<String>,
    pub csv_to_expected: IndexMap<String, Option<String>>,
    pub expected_to_db: IndexMap<String, Option<String>>,
    pub duplicate_columns: Vec<String>,
    pub can_import: bool,
    pub preview_rows: Vec<Record>,
    pub source_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Limits applied when issuing previews
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSettings {
    pub max_upload_bytes: u64,
    pub ttl: Duration,
    pub row_limit: usize,
}

impl PreviewSettings {
    pub fn from_config(config: &CaretabConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            ttl: config.preview_ttl(),
            row_limit: config.preview_row_limit,
        }
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self::from_config(&CaretabConfig::default())
    }
}

/// What a cleanup sweep may remove
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOptions {
    /// Report what would be removed without touching anything
    pub dry_run: bool,
    /// After dropping expired files, remove the oldest staged previews
    /// until the staging directory holds at most this many bytes
    pub max_staging_bytes: Option<u64>,
}

/// Counts from a cleanup sweep. In a dry run they describe what would go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    #[serde(default)]
    pub dry_run: bool,
    pub entries_removed: usize,
    pub files_removed: usize,
    pub bytes_freed: u64,
    /// Staged files removed for exceeding the size limit
    #[serde(default)]
    pub evicted_for_size: usize,
    /// Names of the staged files removed
    #[serde(default)]
    pub files: Vec<String>,
}

/// What the staging directory currently holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub staged_previews: usize,
    /// Staged previews past their expiry, or unreadable
    pub expired_previews: usize,
    pub oldest_file_age_secs: Option<u64>,
}

/// Cache of parsed uploads keyed by single-use tokens.
///
/// Entries live in memory and, when a staging directory is configured, as
/// `<token>.json` files so another process can commit them. A checkout
/// claims the staged file by renaming it, which makes it visible to exactly
/// one committer.
pub struct PreviewCache {
    entries: Mutex<HashMap<String, ParsedDataset>>,
    /// Consumed tokens and when they would have expired
    consumed: Mutex<HashMap<String, DateTime<Utc>>>,
    staging_dir: Option<PathBuf>,
    settings: PreviewSettings,
}

impl PreviewCache {
    /// In-memory cache for a single process
    pub fn in_memory(settings: PreviewSettings) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            consumed: Mutex::new(HashMap::new()),
            staging_dir: None,
            settings,
        }
    }

    /// Cache that also persists entries under `staging_dir`
    pub fn with_staging(staging_dir: &Path, settings: PreviewSettings) -> Result<Self> {
        fs::create_dir_all(staging_dir)?;
        Ok(Self {
            staging_dir: Some(staging_dir.to_path_buf()),
            ..Self::in_memory(settings)
        })
    }

    pub fn settings(&self) -> &PreviewSettings {
        &self.settings
    }

    /// Number of entries currently held in memory
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Preview a file on disk; the size ceiling is checked from metadata first
    pub fn preview_file(&self, db: &Database, path: &Path) -> Result<PreviewResponse> {
        let size = fs::metadata(path)?.len();
        self.check_size(size)?;
        if !DataProcessor::is_supported_format(path) {
            return Err(CaretabError::invalid_input(format!(
                "Unsupported file type '{}': expected a .csv, .tsv or .txt file",
                path.display()
            )));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = fs::read(path)?;
        self.preview_bytes(db, &bytes, &filename)
    }

    /// Preview from a stream, reading no more than one byte past the ceiling
    pub fn preview_reader<R: Read>(&self, db: &Database, reader: R, filename: &str) -> Result<PreviewResponse> {
        let limit = self.settings.max_upload_bytes;
        let mut bytes = Vec::new();
        reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
        self.preview_bytes(db, &bytes, filename)
    }

    /// Parse an upload, match its headers and issue a token for it
    pub fn preview_bytes(&self, db: &Database, bytes: &[u8], filename: &str) -> Result<PreviewResponse> {
        self.check_size(bytes.len() as u64)?;

        let processor = DataProcessor::new()?;
        let table = processor.parse_bytes(bytes, filename, self.staging_dir.as_deref())?;
        let storage_columns = db.table_columns(RECORDS_TABLE)?;
        let column_match = match_columns(&table.columns, db.schema(), &storage_columns);

        let created_at = Utc::now();
        let dataset = ParsedDataset {
            token: new_token(),
            filename: filename.to_string(),
            total_rows: table.row_count(),
            csv_columns: table.columns,
            rows: table.rows,
            created_at,
            expires_at: created_at + self.settings.ttl,
            column_match,
            source_hash: blake3::hash(bytes).to_hex().to_string(),
        };

        let response = dataset.to_response(self.settings.row_limit);
        self.insert(dataset)?;
        log::info!(
            "Issued preview token {} for '{}' ({} rows, importable: {})",
            response.token,
            response.filename,
            response.total_rows,
            response.can_import
        );
        Ok(response)
    }

    fn check_size(&self, size: u64) -> Result<()> {
        let limit = self.settings.max_upload_bytes;
        if size > limit {
            return Err(CaretabError::FileTooLarge { size, limit });
        }
        Ok(())
    }

    fn insert(&self, dataset: ParsedDataset) -> Result<()> {
        if let Some(dir) = &self.staging_dir {
            write_staged(dir, &dataset)?;
        }
        self.entries
            .lock()
            .map_err(|_| CaretabError::poisoned("preview cache"))?
            .insert(dataset.token.clone(), dataset);
        Ok(())
    }

    /// Take the dataset for `token` out of the cache.
    ///
    /// While the lease is alive no other caller can check the token out.
    /// Consuming the lease retires the token; dropping it puts the dataset
    /// back.
    pub fn checkout(&self, token: &str) -> Result<TokenLease<'_>> {
        let token = token.trim().to_ascii_lowercase();
        let token = token.as_str();
        if !is_well_formed(token) {
            return Err(CaretabError::token_invalid(token, TokenRejection::Unknown));
        }

        let in_memory = self
            .entries
            .lock()
            .map_err(|_| CaretabError::poisoned("preview cache"))?
            .remove(token);

        let (dataset, claim) = match &self.staging_dir {
            Some(dir) => match claim_staged(dir, token)? {
                Some(claim) => {
                    let dataset = match in_memory {
                        Some(dataset) => dataset,
                        None => read_staged(&claim)?,
                    };
                    (Some(dataset), Some(claim))
                }
                None => (None, None),
            },
            None => (in_memory, None),
        };

        let Some(dataset) = dataset else {
            return Err(CaretabError::token_invalid(token, self.rejection_for_missing(token)));
        };

        if dataset.is_expired_at(Utc::now()) {
            log::info!("Preview token {} expired at {}", token, dataset.expires_at);
            if let Some(claim) = &claim {
                remove_quietly(claim);
            }
            return Err(CaretabError::token_invalid(token, TokenRejection::Expired));
        }

        log::debug!("Checked out preview token {}", token);
        Ok(TokenLease {
            cache: self,
            dataset: Some(dataset),
            claim,
        })
    }

    fn rejection_for_missing(&self, token: &str) -> TokenRejection {
        let consumed = self
            .consumed
            .lock()
            .map(|consumed| consumed.contains_key(token))
            .unwrap_or(false);
        if consumed {
            TokenRejection::Consumed
        } else {
            TokenRejection::Unknown
        }
    }

    fn restore(&self, dataset: ParsedDataset, claim: Option<PathBuf>) {
        if let (Some(claim), Some(dir)) = (claim, &self.staging_dir) {
            let staged = staged_path(dir, &dataset.token);
            if let Err(e) = fs::rename(&claim, &staged) {
                log::warn!("Could not return staged preview {}: {}", dataset.token, e);
            }
        }
        log::debug!("Returned preview token {} to the cache", dataset.token);
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(dataset.token.clone(), dataset);
            }
            Err(_) => log::warn!("Preview cache lock poisoned; dropping token {}", dataset.token),
        }
    }

    fn retire(&self, token: &str, expires_at: DateTime<Utc>, claim: Option<PathBuf>) {
        if let Some(claim) = claim {
            remove_quietly(&claim);
        }
        if let Ok(mut consumed) = self.consumed.lock() {
            consumed.insert(token.to_string(), expires_at);
        }
        log::info!("Preview token {} consumed", token);
    }

    /// Drop expired entries from memory and from the staging directory.
    pub fn purge_expired(&self) -> Result<PurgeReport> {
        self.purge(PurgeOptions::default())
    }

    /// Sweep the cache and the staging directory.
    ///
    /// Expired previews go first, together with claim and upload scratch
    /// files older than the TTL; they belong to processes that died
    /// mid-commit. With a size limit, the oldest remaining previews follow
    /// until the directory fits. Consumed-token records past their expiry
    /// are forgotten, after which such a token reads as unknown.
    pub fn purge(&self, options: PurgeOptions) -> Result<PurgeReport> {
        let now = Utc::now();
        let mut report = PurgeReport {
            dry_run: options.dry_run,
            ..PurgeReport::default()
        };

        {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| CaretabError::poisoned("preview cache"))?;
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, dataset)| dataset.is_expired_at(now))
                .map(|(token, _)| token.clone())
                .collect();
            report.entries_removed = expired.len();
            if !options.dry_run {
                for token in &expired {
                    entries.remove(token);
                }
            }
        }
        if !options.dry_run {
            let mut consumed = self
                .consumed
                .lock()
                .map_err(|_| CaretabError::poisoned("preview cache"))?;
            consumed.retain(|_, expires_at| *expires_at > now);
        }

        let Some(dir) = &self.staging_dir else {
            return Ok(report);
        };
        let stale_before = now - self.settings.ttl;
        let (mut doomed, mut kept): (Vec<StagingFile>, Vec<StagingFile>) = scan_staging(dir)?
            .into_iter()
            .partition(|file| file.is_expired(now, stale_before));

        if let Some(limit) = options.max_staging_bytes {
            let mut total: u64 = kept.iter().map(|f| f.size).sum();
            if total > limit {
                kept.sort_by_key(|f| f.modified);
                // Claims and scratch files belong to work in progress
                for file in kept.into_iter().filter(|f| matches!(f.kind, StagingKind::Preview { .. })) {
                    if total <= limit {
                        break;
                    }
                    total -= file.size;
                    report.evicted_for_size += 1;
                    doomed.push(file);
                }
            }
        }

        for file in doomed {
            if options.dry_run {
                log::info!("Would remove {} ({} bytes)", file.path.display(), file.size);
            } else {
                fs::remove_file(&file.path)?;
                log::debug!("Removed {}", file.path.display());
                if let Some(token) = file.token() {
                    if let Ok(mut entries) = self.entries.lock() {
                        entries.remove(token);
                    }
                }
            }
            report.files_removed += 1;
            report.bytes_freed += file.size;
            report.files.push(file.name);
        }

        log::info!(
            "{}{} cached and {} staged previews ({} bytes)",
            if options.dry_run { "Would purge " } else { "Purged " },
            report.entries_removed,
            report.files_removed,
            report.bytes_freed
        );
        Ok(report)
    }

    /// Count and size the files in the staging directory
    pub fn staging_stats(&self) -> Result<StagingStats> {
        let mut stats = StagingStats::default();
        let Some(dir) = &self.staging_dir else {
            return Ok(stats);
        };

        let now = Utc::now();
        for file in scan_staging(dir)? {
            stats.total_files += 1;
            stats.total_bytes += file.size;
            if let StagingKind::Preview { expires_at } = file.kind {
                stats.staged_previews += 1;
                if expires_at.map_or(true, |at| at <= now) {
                    stats.expired_previews += 1;
                }
            }
            let age = (now - file.modified).num_seconds().max(0) as u64;
            stats.oldest_file_age_secs = Some(stats.oldest_file_age_secs.map_or(age, |oldest| oldest.max(age)));
        }
        Ok(stats)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StagingKind {
    /// `<token>.json`; `None` when its expiry cannot be read
    Preview { expires_at: Option<DateTime<Utc>> },
    Claim,
    Scratch,
    Other,
}

/// A file found in the staging directory
#[derive(Debug)]
struct StagingFile {
    path: PathBuf,
    name: String,
    size: u64,
    modified: DateTime<Utc>,
    kind: StagingKind,
}

impl StagingFile {
    fn is_expired(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> bool {
        match self.kind {
            StagingKind::Preview { expires_at: Some(at) } => at <= now,
            StagingKind::Preview { expires_at: None } => {
                log::warn!("Unreadable staged preview {}", self.path.display());
                true
            }
            StagingKind::Claim | StagingKind::Scratch => self.modified <= stale_before,
            StagingKind::Other => false,
        }
    }

    fn token(&self) -> Option<&str> {
        match self.kind {
            StagingKind::Preview { .. } => self.path.file_stem()?.to_str(),
            _ => None,
        }
    }
}

fn scan_staging(dir: &Path) -> Result<Vec<StagingFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        let metadata = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();

        let kind = if path.extension().and_then(|e| e.to_str()) == Some(STAGED_EXTENSION) {
            StagingKind::Preview {
                expires_at: read_staged_expiry(&path),
            }
        } else if name.contains(CLAIM_MARKER) {
            StagingKind::Claim
        } else if name.starts_with("caretab-upload-") || name.starts_with(".staging-") {
            StagingKind::Scratch
        } else {
            StagingKind::Other
        };

        files.push(StagingFile {
            path,
            name,
            size: metadata.len(),
            modified: metadata.modified()?.into(),
            kind,
        });
    }
    Ok(files)
}

/// A checked-out preview. Returned to the cache on drop unless consumed.
pub struct TokenLease<'a> {
    cache: &'a PreviewCache,
    dataset: Option<ParsedDataset>,
    claim: Option<PathBuf>,
}

impl TokenLease<'_> {
    pub fn dataset(&self) -> &ParsedDataset {
        // Only `consume` and `drop` take the dataset, and both end the lease
        self.dataset.as_ref().unwrap_or_else(|| unreachable!("lease used after consume"))
    }

    pub fn token(&self) -> &str {
        &self.dataset().token
    }

    /// Retire the token for good
    pub fn consume(mut self) {
        if let Some(dataset) = self.dataset.take() {
            self.cache.retire(&dataset.token, dataset.expires_at, self.claim.take());
        }
    }
}

impl std::fmt::Debug for TokenLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLease")
            .field("dataset", &self.dataset)
            .field("claim", &self.claim)
            .finish_non_exhaustive()
    }
}

impl Drop for TokenLease<'_> {
    fn drop(&mut self) {
        if let Some(dataset) = self.dataset.take() {
            self.cache.restore(dataset, self.claim.take());
        }
    }
}

fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Tokens are 32 hex digits; anything else never
/// touches the filesystem.
fn is_well_formed(token: &str) -> bool {
    token.len() == 32 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

fn staged_path(dir: &Path, token: &str) -> PathBuf {
    dir.join(format!("{}.{}", token, STAGED_EXTENSION))
}

fn write_staged(dir: &Path, dataset: &ParsedDataset) -> Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix(".staging-")
        .tempfile_in(dir)?;
    serde_json::to_writer(&mut file, dataset)?;
    file.flush()?;
    file.persist(staged_path(dir, &dataset.token))
        .map_err(|e| CaretabError::Io(e.error))?;
    Ok(())
}

/// Atomically claim `<token>.json`; `None` when no such file exists
fn claim_staged(dir: &Path, token: &str) -> Result<Option<PathBuf>> {
    let staged = staged_path(dir, token);
    let claim = dir.join(format!(
        "{}{}{}",
        token,
        CLAIM_MARKER,
        uuid::Uuid::new_v4().simple()
    ));
    match fs::rename(&staged, &claim) {
        Ok(()) => Ok(Some(claim)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_staged(path: &Path) -> Result<ParsedDataset> {
    let file = fs::File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

#[derive(Deserialize)]
struct StagedExpiry {
    expires_at: DateTime<Utc>,
}

fn read_staged_expiry(path: &Path) -> Option<DateTime<Utc>> {
    let file = fs::File::open(path).ok()?;
    serde_json::from_reader::<_, StagedExpiry>(std::io::BufReader::new(file))
        .ok()
        .map(|s| s.expires_at)
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("Could not remove {}: {}", path.display(), e);
    }
}
