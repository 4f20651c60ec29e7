//! Snapshot and restore of the four layout artifacts.
//!
//! # Invariants
//! - A snapshot is `<artifact>.bak` beside the artifact and is written at
//!   most once; an existing snapshot is never overwritten.
//! - Restore never stops at the first failing file.

use crate::service::fs_util::{collect_files, make_path_writable};
use log::{info, warn};
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const SNAPSHOT_SUFFIX: &str = ".bak";

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Debug)]
pub enum SnapshotError {
    /// The directory to restore from does not exist.
    NotFound(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "layout directory not found: {}", path.display()),
            Self::Io { path, source } => {
                write!(f, "snapshot i/o error at {}: {source}", path.display())
            }
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound(_) => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// `<path>.bak`.
pub fn snapshot_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(SNAPSHOT_SUFFIX);
    PathBuf::from(name)
}

/// Inverse of `snapshot_path`; `None` when `path` is not a snapshot.
pub fn original_path(path: &Path) -> Option<PathBuf> {
    let text = path.to_str()?;
    let original = text.strip_suffix(SNAPSHOT_SUFFIX)?;
    if original.is_empty() || original.ends_with(std::path::MAIN_SEPARATOR) {
        return None;
    }
    Some(PathBuf::from(original))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub created: Vec<PathBuf>,
    /// Snapshots left as they were from an earlier run.
    pub existing: Vec<PathBuf>,
    /// Artifacts that do not exist and so have nothing to snapshot.
    pub missing: Vec<PathBuf>,
}

/// Copies each artifact to its snapshot unless the snapshot already exists.
pub fn snapshot(artifacts: &[PathBuf]) -> SnapshotResult<SnapshotReport> {
    let mut report = SnapshotReport::default();
    for artifact in artifacts {
        let target = snapshot_path(artifact);
        if target.exists() {
            report.existing.push(target);
            continue;
        }
        if !artifact.is_file() {
            warn!(
                "event=snapshot module=snapshot status=warn reason=artifact_missing path={}",
                artifact.display()
            );
            report.missing.push(artifact.clone());
            continue;
        }

        fs::copy(artifact, &target).map_err(|source| SnapshotError::Io {
            path: target.clone(),
            source,
        })?;
        info!(
            "event=snapshot module=snapshot status=ok path={}",
            target.display()
        );
        report.created.push(target);
    }
    Ok(report)
}

/// One snapshot that could not be copied back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreFailure {
    pub snapshot: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Originals overwritten from their snapshot.
    pub restored: Vec<PathBuf>,
    pub failures: Vec<RestoreFailure>,
}

impl RestoreReport {
    /// True when no snapshot existed at all.
    pub fn nothing_to_restore(&self) -> bool {
        self.restored.is_empty() && self.failures.is_empty()
    }
}

/// Copies every snapshot under `layout_dir` back over its original.
pub fn restore(layout_dir: &Path) -> SnapshotResult<RestoreReport> {
    if !layout_dir.is_dir() {
        return Err(SnapshotError::NotFound(layout_dir.to_path_buf()));
    }
    let snapshots = collect_files(layout_dir, &|path| original_path(path).is_some()).map_err(
        |source| SnapshotError::Io {
            path: layout_dir.to_path_buf(),
            source,
        },
    )?;

    let mut report = RestoreReport::default();
    if snapshots.is_empty() {
        info!("event=restore module=snapshot status=skipped reason=nothing_to_restore");
        return Ok(report);
    }

    for snapshot in snapshots {
        let Some(original) = original_path(&snapshot) else {
            continue;
        };
        match restore_one(&snapshot, &original) {
            Ok(()) => {
                info!(
                    "event=restore_file module=snapshot status=ok path={}",
                    original.display()
                );
                report.restored.push(original);
            }
            Err(err) => {
                warn!(
                    "event=restore_file module=snapshot status=error path={} error={}",
                    original.display(),
                    err
                );
                report.failures.push(RestoreFailure {
                    snapshot,
                    message: err.to_string(),
                });
            }
        }
    }

    info!(
        "event=restore module=snapshot status=ok restored={} failed={}",
        report.restored.len(),
        report.failures.len()
    );
    Ok(report)
}

fn restore_one(snapshot: &Path, original: &Path) -> std::io::Result<()> {
    if original.exists() {
        make_path_writable(original)?;
    }
    fs::copy(snapshot, original)?;
    Ok(())
}
