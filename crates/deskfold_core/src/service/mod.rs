//! Pipeline stages and their orchestration.
//!
//! # Responsibility
//! - Turn store rows into a layout plan and commit it to every artifact.
//! - Keep the CLI decoupled from storage, markup and archive details.
//!
//! # Invariants
//! - Data flows reader -> planner -> allocator -> writers -> verifier.
//! - Snapshots are taken before the first write of a run.

pub mod allocator;
pub mod archive;
pub mod backup_reader;
pub mod fs_util;
pub mod markup;
pub mod pipeline;
pub mod planner;
pub mod snapshot;
pub mod verifier;
