//! Core of the desktop layout reorganizer.
//! This crate owns every layout invariant; the CLI only parses arguments.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, RunConfig, RunConfigBuilder};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::item::{Container, DesktopItem, ItemId, ItemKind, Screen};
pub use model::mapping::{CategoryMapping, MappingError};
pub use model::plan::{CategoryBucket, FolderPlacement, LayoutPlan};
pub use repo::layout_repo::{LayoutRepository, RepoError, RepoResult, SqliteLayoutRepository};
pub use service::pipeline::{
    category_stats, harvest_app_names, restore_layout, CategoryStats, LayoutError, LayoutResult,
    Pipeline, PipelineStage, PipelineWarning, ReorganizeOptions, ReorganizeReport,
};
pub use service::snapshot::{RestoreFailure, RestoreReport};
pub use service::verifier::VerificationReport;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
