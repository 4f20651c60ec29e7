//! Launcher archive repacking.
//!
//! # Responsibility
//! - Rebuild `com.android.launcher.tar` from the extracted tree after the
//!   store has been rewritten.
//! - Reproduce the reference archive's member list exactly when one exists,
//!   and fall back to a whole-directory archive otherwise.
//!
//! # Invariants
//! - Exact mode keeps member names, order, type and mtime; ownership and
//!   mode are zeroed; only payload bytes change.
//! - Reference members without a local file are skipped with a warning.
//! - The target is replaced by rename from a sibling temp file; a failed
//!   repack never leaves a truncated archive behind.

use crate::service::backup_reader::{BackupLocation, EXTRACTED_DIR};
use crate::service::fs_util::collect_files;
use crate::service::snapshot::{original_path, snapshot_path};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};

const JOURNAL_SUFFIX: &str = "-journal";
const TEMP_SUFFIX: &str = ".tmp";
/// Width of the ustar/GNU in-header name and link fields.
const HEADER_NAME_LEN: usize = 100;

pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[derive(Debug)]
pub enum ArchiveError {
    NotFound(PathBuf),
    Io {
        path: PathBuf,
        source: io::Error,
    },
}

impl Display for ArchiveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "archive source not found: {}", path.display()),
            Self::Io { path, source } => {
                write!(f, "archive i/o error at {}: {source}", path.display())
            }
        }
    }
}

impl Error for ArchiveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound(_) => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepackMode {
    /// Member list reproduced from a reference archive.
    Exact,
    /// Whole `data/` directory archived without a reference.
    Simplified,
}

impl RepackMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Simplified => "simplified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackReport {
    pub mode: RepackMode,
    pub members_written: usize,
    /// `None` in simplified mode.
    pub members_in_reference: Option<usize>,
    /// Reference member names with no local replacement.
    pub skipped: Vec<String>,
    pub bytes: u64,
    /// Why the simplified archive was written instead of an exact one.
    pub fallback_reason: Option<String>,
}

/// Strategy that rebuilds the archive from a layout directory.
pub trait Repacker {
    fn mode(&self) -> RepackMode;
    /// Writes the archive at `target` from files under `layout_dir`.
    fn repack(&self, layout_dir: &Path, target: &Path) -> ArchiveResult<RepackReport>;
}

/// Reproduces a reference archive's member list with fresh payloads.
#[derive(Debug, Clone)]
pub struct TemplateRepacker {
    reference: PathBuf,
}

impl TemplateRepacker {
    pub fn new(reference: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

/// Archives every file of the extracted `data/` directory.
///
/// Snapshots and rollback journals are left out.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryRepacker;

#[derive(Debug, Clone)]
struct ReferenceMember {
    name: Vec<u8>,
    entry_type: EntryType,
    mtime: u64,
    link_name: Option<Vec<u8>>,
}

impl Repacker for TemplateRepacker {
    fn mode(&self) -> RepackMode {
        RepackMode::Exact
    }

    fn repack(&self, layout_dir: &Path, target: &Path) -> ArchiveResult<RepackReport> {
        let members = read_reference_members(&self.reference)?;
        let mut skipped = Vec::new();

        write_replacing(target, |builder| {
            for member in &members {
                let display_name = String::from_utf8_lossy(&member.name).into_owned();
                let mut header = canonical_header(member.entry_type, member.mtime);

                if member.entry_type.is_file() {
                    let local = layout_dir.join(display_name.trim_end_matches('/'));
                    if !local.is_file() {
                        warn!(
                            "event=archive_member module=archive status=warn reason=missing_local member={}",
                            display_name
                        );
                        skipped.push(display_name);
                        continue;
                    }
                    let file = File::open(&local)?;
                    header.set_size(file.metadata()?.len());
                    append_named(builder, &mut header, &member.name, file)?;
                } else {
                    header.set_size(0);
                    if let Some(link) = &member.link_name {
                        set_link_bytes(&mut header, link)?;
                    }
                    append_named(builder, &mut header, &member.name, io::empty())?;
                }
            }
            Ok(())
        })?;

        let report = RepackReport {
            mode: RepackMode::Exact,
            members_written: count_members(target)?,
            members_in_reference: Some(members.len()),
            skipped,
            bytes: file_len(target)?,
            fallback_reason: None,
        };
        Ok(report)
    }
}

impl Repacker for DirectoryRepacker {
    fn mode(&self) -> RepackMode {
        RepackMode::Simplified
    }

    fn repack(&self, layout_dir: &Path, target: &Path) -> ArchiveResult<RepackReport> {
        let data_dir = layout_dir.join(EXTRACTED_DIR);
        if !data_dir.is_dir() {
            return Err(ArchiveError::NotFound(data_dir));
        }
        let members = collect_files(&data_dir, &|path| {
            original_path(path).is_none() && !path.to_string_lossy().ends_with(JOURNAL_SUFFIX)
        })
        .map_err(io_error(&data_dir))?;

        write_replacing(target, |builder| {
            for path in &members {
                let name = path
                    .strip_prefix(layout_dir)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
                builder.append_path_with_name(path, name)?;
            }
            Ok(())
        })?;

        Ok(RepackReport {
            mode: RepackMode::Simplified,
            members_written: count_members(target)?,
            members_in_reference: None,
            skipped: Vec::new(),
            bytes: file_len(target)?,
            fallback_reason: None,
        })
    }
}

/// Picks exact mode when the archive snapshot exists beside the target.
pub fn select_repacker(archive_path: &Path) -> Box<dyn Repacker> {
    let reference = snapshot_path(archive_path);
    if reference.is_file() {
        Box::new(TemplateRepacker::new(reference))
    } else {
        Box::new(DirectoryRepacker)
    }
}

/// Removes a stale rollback journal next to the store.
///
/// Returns whether a journal was removed.
pub fn remove_stale_journal(store_path: &Path) -> io::Result<bool> {
    let mut journal = store_path.as_os_str().to_owned();
    journal.push(JOURNAL_SUFFIX);
    let journal = PathBuf::from(journal);
    if !journal.is_file() {
        return Ok(false);
    }
    fs::remove_file(&journal)?;
    info!(
        "event=journal_remove module=archive status=ok path={}",
        journal.display()
    );
    Ok(true)
}

/// Rebuilds the launcher archive for `location` with the selected strategy.
pub fn repack_archive(location: &BackupLocation, store_path: &Path) -> ArchiveResult<RepackReport> {
    let extracted = location.extracted_dir();
    if !extracted.is_dir() {
        return Err(ArchiveError::NotFound(extracted));
    }
    remove_stale_journal(store_path).map_err(io_error(store_path))?;

    let target = location.archive_path();
    let repacker = select_repacker(&target);
    let mut report = match repacker.repack(&location.layout_dir, &target) {
        Ok(report) => report,
        Err(err) if repacker.mode() == RepackMode::Exact => {
            warn!(
                "event=archive_repack module=archive status=warn reason=reference_unusable error={}",
                err
            );
            let mut report = DirectoryRepacker.repack(&location.layout_dir, &target)?;
            report.fallback_reason = Some(format!("reference archive unusable: {err}"));
            report
        }
        Err(err) => return Err(err),
    };
    if report.mode == RepackMode::Simplified && report.fallback_reason.is_none() {
        warn!("event=archive_repack module=archive status=warn reason=no_reference_archive mode=simplified");
        report.fallback_reason = Some("no reference archive snapshot".to_string());
    }

    info!(
        "event=archive_repack module=archive status=ok mode={} members={} reference_members={} skipped={} bytes={}",
        report.mode.as_str(),
        report.members_written,
        report
            .members_in_reference
            .map_or_else(|| "n/a".to_string(), |count| count.to_string()),
        report.skipped.len(),
        report.bytes
    );
    Ok(report)
}

fn read_reference_members(reference: &Path) -> ArchiveResult<Vec<ReferenceMember>> {
    let file = File::open(reference).map_err(io_error(reference))?;
    let mut archive = Archive::new(file);
    let mut members = Vec::new();
    for entry in archive.entries().map_err(io_error(reference))? {
        let entry = entry.map_err(io_error(reference))?;
        let header = entry.header();
        members.push(ReferenceMember {
            name: entry.path_bytes().into_owned(),
            entry_type: header.entry_type(),
            mtime: header.mtime().map_err(io_error(reference))?,
            link_name: entry.link_name_bytes().map(|link| link.into_owned()),
        });
    }
    Ok(members)
}

fn canonical_header(entry_type: EntryType, mtime: u64) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(0);
    header.set_mtime(mtime);
    header
}

/// Appends with the member name copied byte for byte.
///
/// Names that do not fit the header field go through the builder's long
/// name extension.
fn append_named<R: io::Read>(
    builder: &mut Builder<File>,
    header: &mut Header,
    name: &[u8],
    data: R,
) -> io::Result<()> {
    if name.len() <= HEADER_NAME_LEN {
        let field = &mut header.as_old_mut().name;
        field.fill(0);
        field[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(header, data)
    } else {
        let path = PathBuf::from(String::from_utf8_lossy(name).into_owned());
        builder.append_data(header, path, data)
    }
}

fn set_link_bytes(header: &mut Header, link: &[u8]) -> io::Result<()> {
    if link.len() <= HEADER_NAME_LEN {
        let field = &mut header.as_old_mut().linkname;
        field.fill(0);
        field[..link.len()].copy_from_slice(link);
        Ok(())
    } else {
        header.set_link_name(String::from_utf8_lossy(link).into_owned())
    }
}

fn write_replacing<F>(target: &Path, fill: F) -> ArchiveResult<()>
where
    F: FnOnce(&mut Builder<File>) -> io::Result<()>,
{
    let mut temp = target.as_os_str().to_owned();
    temp.push(TEMP_SUFFIX);
    let temp = PathBuf::from(temp);

    let written = File::create(&temp).and_then(|file| {
        let mut builder = Builder::new(file);
        fill(&mut builder)?;
        builder.into_inner()?.sync_all()
    });
    if let Err(source) = written {
        let _ = fs::remove_file(&temp);
        return Err(ArchiveError::Io { path: temp, source });
    }

    fs::rename(&temp, target).map_err(io_error(target))
}

fn count_members(path: &Path) -> ArchiveResult<usize> {
    let file = File::open(path).map_err(io_error(path))?;
    let mut archive = Archive::new(file);
    let mut count = 0;
    for entry in archive.entries().map_err(io_error(path))? {
        entry.map_err(io_error(path))?;
        count += 1;
    }
    Ok(count)
}

fn file_len(path: &Path) -> ArchiveResult<u64> {
    Ok(fs::metadata(path).map_err(io_error(path))?.len())
}
