//! Post-write consistency checks across store and markup.
//!
//! # Responsibility
//! - Check referential integrity, root placement and mirror parity in the
//!   store.
//! - Cross-check markup element counts and folder-child page ids against the
//!   committed rows.
//!
//! # Invariants
//! - Verification is read-only.
//! - Widget and card elements are excluded from the app/folder comparison.

use crate::model::item::ItemKind;
use crate::repo::layout_repo::{LayoutRepository, PlacementCollision, RepoError};
use crate::service::backup_reader::BackupLocation;
use crate::service::markup::{
    folder_screens, read_summary, MarkupDocument, MarkupError, MarkupSummary, PAGE_ID_BASE,
};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type VerifyResult<T> = Result<T, VerifyError>;

#[derive(Debug)]
pub enum VerifyError {
    Repo(RepoError),
    Markup(MarkupError),
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "verification query failed: {err}"),
            Self::Markup(err) => write!(f, "verification could not read markup: {err}"),
        }
    }
}

impl Error for VerifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Markup(err) => Some(err),
        }
    }
}

impl From<RepoError> for VerifyError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<MarkupError> for VerifyError {
    fn from(value: MarkupError) -> Self {
        Self::Markup(value)
    }
}

/// Row counts of one working/mirror table pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableParity {
    pub table: &'static str,
    pub mirror_table: &'static str,
    pub rows: i64,
    pub mirror_rows: i64,
}

impl TableParity {
    pub fn is_equal(&self) -> bool {
        self.rows == self.mirror_rows
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub orphans: i64,
    pub collisions: Vec<PlacementCollision>,
    pub items: i64,
    /// Empty when the store has no mirror tables.
    pub mirror_parity: Vec<TableParity>,
    pub relational_apps: usize,
    pub relational_folders: usize,
    pub markup: Vec<(MarkupDocument, MarkupSummary)>,
    /// Folder children whose markup page id disagrees with the parent folder.
    pub misplaced_folder_children: usize,
}

impl VerificationReport {
    /// Human-readable description of every failed check.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.orphans > 0 {
            issues.push(format!("{} item(s) reference a missing folder", self.orphans));
        }
        for collision in &self.collisions {
            issues.push(format!(
                "{} root items share screen {} cell ({}, {})",
                collision.count, collision.screen, collision.cell_x, collision.cell_y
            ));
        }
        for parity in self.mirror_parity.iter().filter(|parity| !parity.is_equal()) {
            issues.push(format!(
                "mirror `{}` holds {} rows but `{}` holds {}",
                parity.mirror_table, parity.mirror_rows, parity.table, parity.rows
            ));
        }
        for (document, summary) in &self.markup {
            if summary.applications != self.relational_apps {
                issues.push(format!(
                    "{} lists {} applications but the store holds {}",
                    document.file_name(),
                    summary.applications,
                    self.relational_apps
                ));
            }
            if summary.folders != self.relational_folders {
                issues.push(format!(
                    "{} lists {} folders but the store holds {}",
                    document.file_name(),
                    summary.folders,
                    self.relational_folders
                ));
            }
        }
        if self.misplaced_folder_children > 0 {
            issues.push(format!(
                "{} folder child element(s) carry a page id that differs from their folder",
                self.misplaced_folder_children
            ));
        }
        issues
    }

    pub fn is_consistent(&self) -> bool {
        self.issues().is_empty()
    }
}

/// Runs every post-write check against the store and both documents.
pub fn verify(
    repo: &dyn LayoutRepository,
    location: &BackupLocation,
) -> VerifyResult<VerificationReport> {
    let variant = repo.variant();
    let working = variant.working_tables();
    let rows = repo.read_rows()?;

    let mut mirror_parity = Vec::new();
    if let Some(mirror) = variant.mirror_tables() {
        for (table, mirror_table) in [
            (working.items, mirror.items),
            (working.screens, mirror.screens),
        ] {
            mirror_parity.push(TableParity {
                table,
                mirror_table,
                rows: repo.count_rows(table)?,
                mirror_rows: repo.count_rows(mirror_table)?,
            });
        }
    }

    let parent_screens = folder_screens(&rows.items);
    let mut markup = Vec::with_capacity(MarkupDocument::ALL.len());
    let mut misplaced_folder_children = 0;
    for document in MarkupDocument::ALL {
        let summary = read_summary(&document.path_in(location))?;
        misplaced_folder_children += summary
            .folder_child_pages
            .iter()
            .filter(|page| {
                parent_screens
                    .get(&page.container)
                    .map_or(true, |screen| page.page_id != PAGE_ID_BASE + screen)
            })
            .count();
        markup.push((document, summary));
    }

    let report = VerificationReport {
        orphans: repo.count_orphans()?,
        collisions: repo.placement_collisions()?,
        items: repo.count_rows(working.items)?,
        mirror_parity,
        relational_apps: rows
            .items
            .iter()
            .filter(|item| item.kind.is_application_like())
            .count(),
        relational_folders: rows
            .items
            .iter()
            .filter(|item| item.kind == ItemKind::Folder)
            .count(),
        markup,
        misplaced_folder_children,
    };

    let issues = report.issues();
    if issues.is_empty() {
        info!(
            "event=verify module=verifier status=ok items={} apps={} folders={}",
            report.items, report.relational_apps, report.relational_folders
        );
    } else {
        for issue in &issues {
            warn!("event=verify_issue module=verifier status=warn issue={issue}");
        }
    }
    Ok(report)
}
