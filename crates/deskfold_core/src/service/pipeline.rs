//! Reorganize/restore orchestration.
//!
//! # Responsibility
//! - Drive one run through the stage sequence, logging every transition.
//! - Map stage failures onto the `LayoutError` taxonomy.
//!
//! # Invariants
//! - Every failure before `Repacked` is fatal and stops the run.
//! - Every fatal condition that can be detected without mutating anything
//!   (missing backup, mapping, table or required column) is detected before
//!   `Snapshotted`.
//! - The store is opened per stage and closed when the stage ends.
//! - `Repacked` degrades to a simplified archive instead of failing when no
//!   usable reference archive exists.

use crate::config::RunConfig;
use crate::db::{open_store, open_store_read_only, DbError, SchemaVariant};
use crate::model::mapping::{CategoryMapping, MappingError};
use crate::model::plan::LayoutPlan;
use crate::repo::layout_repo::{
    CommitSummary, LayoutRepository, LayoutRows, RepoError, SqliteLayoutRepository,
};
use crate::service::archive::{repack_archive, RepackMode, RepackReport};
use crate::service::backup_reader::{
    extract_if_needed, find_store, locate, BackupLocation, ReaderError,
};
use crate::service::markup::{write_layout_documents, MarkupWriteSummary};
use crate::service::planner::plan_layout;
use crate::service::snapshot::{restore, snapshot, RestoreReport, SnapshotError, SnapshotReport};
use crate::service::verifier::{verify, VerificationReport, VerifyError};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub type LayoutResult<T> = Result<T, LayoutError>;

/// Stages of one reorganize run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Idle,
    Located,
    ConfigLoaded,
    Extracted,
    Read,
    Planned,
    Snapshotted,
    CommittedPrimary,
    CommittedMirror,
    CommittedMarkup,
    Repacked,
    Verified,
    Done,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Located => "located",
            Self::ConfigLoaded => "config_loaded",
            Self::Extracted => "extracted",
            Self::Read => "read",
            Self::Planned => "planned",
            Self::Snapshotted => "snapshotted",
            Self::CommittedPrimary => "committed_primary",
            Self::CommittedMirror => "committed_mirror",
            Self::CommittedMarkup => "committed_markup",
            Self::Repacked => "repacked",
            Self::Verified => "verified",
            Self::Done => "done",
        }
    }

    /// Whether a stopped run at this point has mutated nothing.
    pub fn is_safe_stop(self) -> bool {
        self < Self::Snapshotted
    }
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal pipeline failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Missing backup, archive, store, table or mapping file.
    NotFound(String),
    /// Neither expected table set exists, or a required column is missing.
    SchemaMismatch(String),
    /// A store, markup or archive write failed while reaching `stage`.
    WriteFailure {
        stage: PipelineStage,
        message: String,
    },
    Io(String),
    /// Input exists but cannot be used (malformed mapping, invalid row).
    InvalidInput(String),
}

impl Display for LayoutError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::SchemaMismatch(message) => write!(f, "schema mismatch: {message}"),
            Self::WriteFailure { stage, message } => {
                write!(f, "write failed before stage `{stage}`: {message}")
            }
            Self::Io(message) => write!(f, "i/o error: {message}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
        }
    }
}

impl Error for LayoutError {}

impl From<ReaderError> for LayoutError {
    fn from(value: ReaderError) -> Self {
        match value {
            ReaderError::NotFound { .. } => Self::NotFound(value.to_string()),
            ReaderError::Io { .. } => Self::Io(value.to_string()),
        }
    }
}

impl From<MappingError> for LayoutError {
    fn from(value: MappingError) -> Self {
        match value {
            MappingError::NotFound(_) => Self::NotFound(value.to_string()),
            MappingError::Io { .. } => Self::Io(value.to_string()),
            MappingError::Parse { .. } => Self::InvalidInput(value.to_string()),
        }
    }
}

impl From<DbError> for LayoutError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::SchemaMismatch { .. } | DbError::MissingColumn { .. } => {
                Self::SchemaMismatch(value.to_string())
            }
            DbError::MissingTable(_) => Self::NotFound(value.to_string()),
            DbError::Sqlite(_) => Self::Io(value.to_string()),
        }
    }
}

impl From<RepoError> for LayoutError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Db(err) => err.into(),
            RepoError::InvalidData(_) => Self::InvalidInput(value.to_string()),
        }
    }
}

impl From<SnapshotError> for LayoutError {
    fn from(value: SnapshotError) -> Self {
        match value {
            SnapshotError::NotFound(_) => Self::NotFound(value.to_string()),
            SnapshotError::Io { .. } => Self::Io(value.to_string()),
        }
    }
}

impl From<VerifyError> for LayoutError {
    fn from(value: VerifyError) -> Self {
        match value {
            VerifyError::Repo(err) => err.into(),
            VerifyError::Markup(err) => Self::Io(err.to_string()),
        }
    }
}

fn write_failure(stage: PipelineStage, err: impl Display) -> LayoutError {
    LayoutError::WriteFailure {
        stage,
        message: err.to_string(),
    }
}

/// Non-fatal outcome surfaced next to a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    /// The archive was rebuilt without an exact reference.
    PartialArchiveFidelity { reason: String },
    /// Archive members from the reference had no local file.
    SkippedArchiveMembers(Vec<String>),
    /// Apps whose launch descriptor names no package were left out.
    SkippedApps(usize),
}

impl Display for PipelineWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PartialArchiveFidelity { reason } => {
                write!(f, "archive rebuilt in simplified mode ({reason})")
            }
            Self::SkippedArchiveMembers(names) => {
                write!(f, "{} archive member(s) had no local file", names.len())
            }
            Self::SkippedApps(count) => {
                write!(f, "{count} app(s) without a package name were left out")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReorganizeOptions {
    /// Stop after planning; nothing is snapshotted or written.
    pub dry_run: bool,
    /// Timestamp stamped on rewritten rows; wall clock when `None`.
    pub modified: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReorganizeReport {
    pub timestamp: String,
    pub store_path: PathBuf,
    pub variant: SchemaVariant,
    pub plan: LayoutPlan,
    pub dry_run: bool,
    pub snapshot: Option<SnapshotReport>,
    pub primary: Option<CommitSummary>,
    pub mirror: Option<CommitSummary>,
    pub markup: Option<MarkupWriteSummary>,
    pub archive: Option<RepackReport>,
    pub verification: Option<VerificationReport>,
    pub warnings: Vec<PipelineWarning>,
}

impl ReorganizeReport {
    /// True for dry runs and for runs whose verification found no issue.
    pub fn is_consistent(&self) -> bool {
        self.verification
            .as_ref()
            .map_or(self.dry_run, VerificationReport::is_consistent)
    }
}

/// One reorganize run over the backup selected by `config`.
pub struct Pipeline<'cfg> {
    config: &'cfg RunConfig,
    stage: PipelineStage,
}

impl<'cfg> Pipeline<'cfg> {
    pub fn new(config: &'cfg RunConfig) -> Self {
        Self {
            config,
            stage: PipelineStage::Idle,
        }
    }

    /// Last stage reached.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    fn advance(&mut self, next: PipelineStage) {
        info!(
            "event=stage_transition module=pipeline status=ok from={} to={}",
            self.stage, next
        );
        self.stage = next;
    }

    fn fail(&self, err: LayoutError) -> LayoutError {
        error!(
            "event=pipeline_failed module=pipeline status=error stage={} safe_stop={} error={}",
            self.stage,
            self.stage.is_safe_stop(),
            err
        );
        err
    }

    /// Runs the full reorganize sequence.
    ///
    /// # Errors
    /// - `NotFound` for a missing backup, archive, store, table or mapping.
    /// - `SchemaMismatch` when the store exposes neither table set.
    /// - `WriteFailure` when a store or markup write fails.
    pub fn reorganize(&mut self, options: ReorganizeOptions) -> LayoutResult<ReorganizeReport> {
        self.run(options).map_err(|err| self.fail(err))
    }

    fn run(&mut self, options: ReorganizeOptions) -> LayoutResult<ReorganizeReport> {
        let started_at = std::time::Instant::now();
        info!(
            "event=reorganize module=pipeline status=start dry_run={} work_dir={}",
            options.dry_run,
            self.config.work_dir().display()
        );

        let location = locate(self.config.work_dir())?;
        self.advance(PipelineStage::Located);

        let mapping = CategoryMapping::load(self.config.mapping_path())?;
        info!(
            "event=mapping_load module=pipeline status=ok categories={} packages={}",
            mapping.category_order.len(),
            mapping.app_categories.len()
        );
        self.advance(PipelineStage::ConfigLoaded);

        extract_if_needed(&location)?;
        let store_path = find_store(&location)?;
        self.advance(PipelineStage::Extracted);

        let (variant, rows) = read_layout(&store_path)?;
        self.advance(PipelineStage::Read);

        let modified = options.modified.unwrap_or_else(now_epoch_ms);
        let plan = plan_layout(rows.items, &mapping, self.config, modified);
        let mut warnings = Vec::new();
        if plan.skipped_without_package > 0 {
            warnings.push(PipelineWarning::SkippedApps(plan.skipped_without_package));
        }
        self.advance(PipelineStage::Planned);

        let mut report = ReorganizeReport {
            timestamp: location.timestamp.clone(),
            store_path: store_path.clone(),
            variant,
            plan,
            dry_run: options.dry_run,
            snapshot: None,
            primary: None,
            mirror: None,
            markup: None,
            archive: None,
            verification: None,
            warnings,
        };
        if options.dry_run {
            info!("event=reorganize module=pipeline status=ok dry_run=true");
            self.advance(PipelineStage::Done);
            return Ok(report);
        }

        {
            let conn = open_store_read_only(&store_path)?;
            SqliteLayoutRepository::try_new(&conn)?.preflight()?;
        }
        report.snapshot = Some(snapshot(&layout_artifacts(&location, &store_path))?);
        self.advance(PipelineStage::Snapshotted);

        let conn = open_store(&store_path)
            .map_err(|err| write_failure(PipelineStage::CommittedPrimary, err))?;
        let repo = SqliteLayoutRepository::try_new(&conn)?;
        report.primary = Some(
            repo.replace_layout(&report.plan.items, &report.plan.screens)
                .map_err(|err| write_failure(PipelineStage::CommittedPrimary, err))?,
        );
        self.advance(PipelineStage::CommittedPrimary);

        report.mirror = repo
            .sync_mirror()
            .map_err(|err| write_failure(PipelineStage::CommittedMirror, err))?;
        drop(repo);
        drop(conn);
        self.advance(PipelineStage::CommittedMirror);

        let (_, committed) = read_layout(&store_path)?;
        report.markup = Some(
            write_layout_documents(&location, &committed.items, &committed.screens)
                .map_err(|err| write_failure(PipelineStage::CommittedMarkup, err))?,
        );
        self.advance(PipelineStage::CommittedMarkup);

        let archive = repack_archive(&location, &store_path)
            .map_err(|err| write_failure(PipelineStage::Repacked, err))?;
        if archive.mode == RepackMode::Simplified {
            report.warnings.push(PipelineWarning::PartialArchiveFidelity {
                reason: archive
                    .fallback_reason
                    .clone()
                    .unwrap_or_else(|| "no reference archive".to_string()),
            });
        }
        if !archive.skipped.is_empty() {
            report
                .warnings
                .push(PipelineWarning::SkippedArchiveMembers(archive.skipped.clone()));
        }
        report.archive = Some(archive);
        self.advance(PipelineStage::Repacked);

        {
            let conn = open_store_read_only(&store_path)?;
            let repo = SqliteLayoutRepository::try_new(&conn)?;
            report.verification = Some(verify(&repo, &location)?);
        }
        self.advance(PipelineStage::Verified);

        for warning in &report.warnings {
            warn!("event=pipeline_warning module=pipeline status=warn warning={warning}");
        }
        info!(
            "event=reorganize module=pipeline status=ok folders={} apps={} screens={} consistent={} duration_ms={}",
            report.plan.folder_count(),
            report.plan.app_count(),
            report.plan.screen_count,
            report.is_consistent(),
            started_at.elapsed().as_millis()
        );
        self.advance(PipelineStage::Done);
        Ok(report)
    }
}

/// Store file, both markup documents and the archive of one backup.
pub fn layout_artifacts(location: &BackupLocation, store_path: &Path) -> Vec<PathBuf> {
    vec![
        store_path.to_path_buf(),
        location.workspace_markup_path(),
        location.drawer_markup_path(),
        location.archive_path(),
    ]
}

/// Restores every snapshot under the newest backup's layout directory.
///
/// Finding no snapshot is a successful no-op.
pub fn restore_layout(config: &RunConfig) -> LayoutResult<RestoreReport> {
    let location = locate(config.work_dir())?;
    let report = restore(&location.layout_dir)?;
    for failure in &report.failures {
        warn!(
            "event=restore_failure module=pipeline status=warn path={} error={}",
            failure.snapshot.display(),
            failure.message
        );
    }
    Ok(report)
}

/// Per-category package counts of the mapping document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryStats {
    /// `(label, packages)` in bucket order.
    pub categories: Vec<(String, usize)>,
    pub unclassified: usize,
    pub total: usize,
}

/// Summarizes the mapping document selected by `config`.
pub fn category_stats(config: &RunConfig) -> LayoutResult<CategoryStats> {
    let mapping = CategoryMapping::load(config.mapping_path())?;
    let categories = mapping.category_counts();
    let mapped = categories.iter().map(|(_, count)| count).sum::<usize>();
    let unclassified = mapping.unclassified.len();
    Ok(CategoryStats {
        categories,
        unclassified,
        total: mapped + unclassified,
    })
}

/// Reads `package -> title` pairs from the newest backup's store.
///
/// The first non-blank title seen for a package wins. Read-only.
pub fn harvest_app_names(config: &RunConfig) -> LayoutResult<BTreeMap<String, String>> {
    let location = locate(config.work_dir())?;
    extract_if_needed(&location)?;
    let store_path = find_store(&location)?;
    let (_, rows) = read_layout(&store_path)?;

    let mut names = BTreeMap::new();
    for item in rows
        .items
        .iter()
        .filter(|item| item.kind.is_application_like())
    {
        let (Some(package), Some(title)) = (item.package_name(), item.title.as_deref()) else {
            continue;
        };
        let title = title.trim();
        if !title.is_empty() {
            names
                .entry(package.to_string())
                .or_insert_with(|| title.to_string());
        }
    }
    info!(
        "event=names_harvest module=pipeline status=ok packages={}",
        names.len()
    );
    Ok(names)
}

fn read_layout(store_path: &Path) -> LayoutResult<(SchemaVariant, LayoutRows)> {
    let conn = open_store_read_only(store_path)?;
    let repo = SqliteLayoutRepository::try_new(&conn)?;
    let rows = repo.read_rows()?;
    Ok((repo.variant(), rows))
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{LayoutError, PipelineStage};
    use crate::db::DbError;
    use crate::model::mapping::MappingError;
    use std::path::PathBuf;

    #[test]
    fn only_pre_snapshot_stages_are_safe_stops() {
        assert!(PipelineStage::Planned.is_safe_stop());
        assert!(!PipelineStage::Snapshotted.is_safe_stop());
        assert!(!PipelineStage::CommittedPrimary.is_safe_stop());
        assert!(PipelineStage::Idle < PipelineStage::Done);
    }

    #[test]
    fn layer_errors_map_onto_taxonomy() {
        let missing = LayoutError::from(MappingError::NotFound(PathBuf::from("map.json")));
        assert!(matches!(missing, LayoutError::NotFound(_)));

        let mismatch = LayoutError::from(DbError::SchemaMismatch {
            tables: vec!["favorites".into()],
        });
        assert!(matches!(mismatch, LayoutError::SchemaMismatch(_)));

        let table = LayoutError::from(DbError::MissingTable("singledesktopitems".into()));
        assert!(matches!(table, LayoutError::NotFound(_)));
    }
}
