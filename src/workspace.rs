//! Workspace management for caretab operations

use crate::config::CaretabConfig;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Manages the .caretab workspace directory
#[derive(Debug, Clone)]
pub struct CaretabWorkspace {
    /// Project root directory (where .caretab/ lives)
    pub root: PathBuf,
    /// .caretab/ directory path
    pub caretab_dir: PathBuf,
    /// .caretab/staging/ directory holding previews awaiting commit
    pub staging_dir: PathBuf,
}

impl CaretabWorkspace {
    /// Find existing workspace or create a new one
    pub fn find_or_create(start_dir: Option<&Path>) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let start = start_dir.unwrap_or(&current_dir);

        if let Some(workspace) = Self::find_existing(start)? {
            return Ok(workspace);
        }

        Self::create_new(start.to_path_buf())
    }

    /// Find existing .caretab workspace by walking up directory tree
    fn find_existing(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir;

        loop {
            let caretab_dir = current.join(".caretab");
            if caretab_dir.is_dir() {
                return Ok(Some(Self::from_root(current.to_path_buf())));
            }

            // A repository root bounds the search
            if current.join(".git").exists() {
                break;
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Ok(None)
    }

    /// Create a new workspace in the specified root directory
    pub fn create_new(root: PathBuf) -> Result<Self> {
        let workspace = Self::from_root(root);
        workspace.initialize(false)?;
        log::info!("Created caretab workspace at: {}", workspace.root.display());
        Ok(workspace)
    }

    /// Create directories, config and ignore entries; `force` rewrites the config
    pub fn initialize(&self, force: bool) -> Result<()> {
        fs::create_dir_all(&self.caretab_dir)?;
        fs::create_dir_all(&self.staging_dir)?;

        let config = CaretabConfig {
            created: Some(chrono::Utc::now()),
            ..CaretabConfig::default()
        };
        config.save(&self.config_path(), force)?;

        self.ensure_gitignore()
    }

    /// Create workspace from root directory path
    pub fn from_root(root: PathBuf) -> Self {
        let caretab_dir = root.join(".caretab");
        let staging_dir = caretab_dir.join("staging");

        Self {
            root,
            caretab_dir,
            staging_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.caretab_dir.join("config.json")
    }

    pub fn database_path(&self) -> PathBuf {
        self.caretab_dir.join("caretab.duckdb")
    }

    pub fn load_config(&self) -> Result<CaretabConfig> {
        CaretabConfig::load(&self.config_path())
    }

    /// Ensure .gitignore keeps the database and staged uploads out of version control
    pub fn ensure_gitignore(&self) -> Result<()> {
        let gitignore_path = self.root.join(".gitignore");
        let caretab_ignore =
            "# Ignore caretab database and staged uploads\n.caretab/*.duckdb*\n.caretab/staging/\n";

        if gitignore_path.exists() {
            let content = fs::read_to_string(&gitignore_path)?;
            if !content.contains(".caretab/staging/") {
                let new_content = if content.ends_with('\n') {
                    format!("{}\n{}", content, caretab_ignore)
                } else {
                    format!("{}\n\n{}", content, caretab_ignore)
                };
                fs::write(gitignore_path, new_content)?;
                log::info!("Updated .gitignore with caretab entries");
            }
        } else {
            fs::write(gitignore_path, caretab_ignore)?;
            log::info!("Created .gitignore with caretab entries");
        }

        Ok(())
    }
}
