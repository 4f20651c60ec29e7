//! Backup location, extraction and store discovery.
//!
//! # Responsibility
//! - Find the newest `Data/<timestamp>/Layout` backup under a work directory.
//! - Unpack the launcher archive once, next to itself.
//! - Locate the launcher store inside the extracted tree.
//!
//! # Invariants
//! - Extraction is skipped when the extracted `data/` directory exists.
//! - Extracted members are made writable before any stage touches them.

use crate::service::fs_util::{collect_files, make_tree_writable};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::path::{Path, PathBuf};

pub const BACKUP_DATA_DIR: &str = "Data";
pub const LAYOUT_DIR: &str = "Layout";
pub const ARCHIVE_FILE_NAME: &str = "com.android.launcher.tar";
pub const EXTRACTED_DIR: &str = "data";
pub const STORE_FILE_NAME: &str = "launcher.db";
pub const WORKSPACE_MARKUP_FILE: &str = "launcher_layout.xml";
pub const DRAWER_MARKUP_FILE: &str = "launcher_draw_layout.xml";

pub type ReaderResult<T> = Result<T, ReaderError>;

#[derive(Debug)]
pub enum ReaderError {
    /// A directory or file the backup must contain does not exist.
    NotFound { what: &'static str, path: PathBuf },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for ReaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { what, path } => write!(f, "{what} not found: {}", path.display()),
            Self::Io { path, source } => write!(f, "i/o error at {}: {source}", path.display()),
        }
    }
}

impl Error for ReaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound { .. } => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ReaderError + '_ {
    move |source| ReaderError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One located backup layout directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLocation {
    /// Name of the timestamp directory under `Data/`.
    pub timestamp: String,
    pub layout_dir: PathBuf,
}

impl BackupLocation {
    pub fn archive_path(&self) -> PathBuf {
        self.layout_dir.join(ARCHIVE_FILE_NAME)
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.layout_dir.join(EXTRACTED_DIR)
    }

    pub fn workspace_markup_path(&self) -> PathBuf {
        self.layout_dir.join(WORKSPACE_MARKUP_FILE)
    }

    pub fn drawer_markup_path(&self) -> PathBuf {
        self.layout_dir.join(DRAWER_MARKUP_FILE)
    }
}

/// Whether `extract_if_needed` unpacked anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    AlreadyExtracted,
    Extracted,
}

/// Finds the most recent backup layout directory under `root`.
///
/// Timestamp directory names sort lexically in time order, so the greatest
/// name wins.
pub fn locate(root: &Path) -> ReaderResult<BackupLocation> {
    let data_dir = root.join(BACKUP_DATA_DIR);
    if !data_dir.is_dir() {
        return Err(ReaderError::NotFound {
            what: "backup data directory",
            path: data_dir,
        });
    }

    let mut timestamps = Vec::new();
    for entry in std::fs::read_dir(&data_dir).map_err(io_error(&data_dir))? {
        let entry = entry.map_err(io_error(&data_dir))?;
        if entry.path().is_dir() {
            timestamps.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    let Some(timestamp) = timestamps.into_iter().max() else {
        return Err(ReaderError::NotFound {
            what: "backup timestamp directory",
            path: data_dir,
        });
    };

    let layout_dir = data_dir.join(&timestamp).join(LAYOUT_DIR);
    if !layout_dir.is_dir() {
        return Err(ReaderError::NotFound {
            what: "backup layout directory",
            path: layout_dir,
        });
    }

    info!(
        "event=backup_locate module=reader status=ok timestamp={} layout_dir={}",
        timestamp,
        layout_dir.display()
    );
    Ok(BackupLocation {
        timestamp,
        layout_dir,
    })
}

/// Unpacks the launcher archive into the layout directory once.
pub fn extract_if_needed(location: &BackupLocation) -> ReaderResult<ExtractOutcome> {
    let archive_path = location.archive_path();
    if !archive_path.is_file() {
        return Err(ReaderError::NotFound {
            what: "launcher archive",
            path: archive_path,
        });
    }

    let extracted_dir = location.extracted_dir();
    if extracted_dir.is_dir() {
        info!("event=archive_extract module=reader status=skipped reason=already_extracted");
        make_tree_writable(&extracted_dir).map_err(io_error(&extracted_dir))?;
        return Ok(ExtractOutcome::AlreadyExtracted);
    }

    let file = File::open(&archive_path).map_err(io_error(&archive_path))?;
    let mut archive = tar::Archive::new(file);
    archive
        .unpack(&location.layout_dir)
        .map_err(io_error(&archive_path))?;
    if extracted_dir.exists() {
        make_tree_writable(&extracted_dir).map_err(io_error(&extracted_dir))?;
    }

    info!(
        "event=archive_extract module=reader status=ok target={}",
        extracted_dir.display()
    );
    Ok(ExtractOutcome::Extracted)
}

/// Finds the launcher store inside the extracted tree.
///
/// The first match in path order wins.
pub fn find_store(location: &BackupLocation) -> ReaderResult<PathBuf> {
    let extracted_dir = location.extracted_dir();
    if !extracted_dir.is_dir() {
        return Err(ReaderError::NotFound {
            what: "extracted data directory",
            path: extracted_dir,
        });
    }

    let matches = collect_files(&extracted_dir, &|path| {
        path.file_name().is_some_and(|name| name == STORE_FILE_NAME)
    })
    .map_err(io_error(&extracted_dir))?;

    matches
        .into_iter()
        .next()
        .ok_or_else(|| ReaderError::NotFound {
            what: "launcher store",
            path: extracted_dir.join("**").join(STORE_FILE_NAME),
        })
}
