//! Run configuration shared by every pipeline stage.
//!
//! # Responsibility
//! - Resolve the work directory, mapping path and naming defaults once.
//!
//! # Invariants
//! - A `RunConfig` is immutable after `build()`.
//! - `work_dir` exists and is a directory.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAPPING_FILE_NAME: &str = "app_categories.json";
pub const DEFAULT_FALLBACK_CATEGORY: &str = "Other";
/// The launcher renders folder titles with one leading space.
pub const DEFAULT_FOLDER_TITLE_PREFIX: &str = " ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    WorkDirNotFound(PathBuf),
    EmptyFallbackCategory,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WorkDirNotFound(path) => {
                write!(f, "work directory does not exist: {}", path.display())
            }
            Self::EmptyFallbackCategory => write!(f, "fallback category label must not be blank"),
        }
    }
}

impl Error for ConfigError {}

/// Immutable configuration for one process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    work_dir: PathBuf,
    mapping_path: PathBuf,
    fallback_category: String,
    folder_title_prefix: String,
}

impl RunConfig {
    pub fn builder(work_dir: impl Into<PathBuf>) -> RunConfigBuilder {
        RunConfigBuilder {
            work_dir: work_dir.into(),
            mapping_path: None,
            fallback_category: DEFAULT_FALLBACK_CATEGORY.to_string(),
            folder_title_prefix: DEFAULT_FOLDER_TITLE_PREFIX.to_string(),
        }
    }

    /// Root that holds `Data/<timestamp>/Layout` backups.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn mapping_path(&self) -> &Path {
        &self.mapping_path
    }

    /// Label of the folder that collects unmapped apps.
    pub fn fallback_category(&self) -> &str {
        &self.fallback_category
    }

    pub fn folder_title_prefix(&self) -> &str {
        &self.folder_title_prefix
    }

    /// Folder title written for a category label.
    pub fn folder_title(&self, label: &str) -> String {
        format!("{}{label}", self.folder_title_prefix)
    }
}

/// Builder for `RunConfig`.
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    work_dir: PathBuf,
    mapping_path: Option<PathBuf>,
    fallback_category: String,
    folder_title_prefix: String,
}

impl RunConfigBuilder {
    /// Overrides `<work_dir>/app_categories.json`.
    pub fn mapping_path(mut self, path: Option<PathBuf>) -> Self {
        self.mapping_path = path;
        self
    }

    pub fn fallback_category(mut self, label: impl Into<String>) -> Self {
        self.fallback_category = label.into();
        self
    }

    pub fn folder_title_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.folder_title_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<RunConfig, ConfigError> {
        if !self.work_dir.is_dir() {
            return Err(ConfigError::WorkDirNotFound(self.work_dir));
        }
        let fallback_category = self.fallback_category.trim().to_string();
        if fallback_category.is_empty() {
            return Err(ConfigError::EmptyFallbackCategory);
        }

        let mapping_path = self
            .mapping_path
            .unwrap_or_else(|| self.work_dir.join(DEFAULT_MAPPING_FILE_NAME));
        Ok(RunConfig {
            work_dir: self.work_dir,
            mapping_path,
            fallback_category,
            folder_title_prefix: self.folder_title_prefix,
        })
    }
}
