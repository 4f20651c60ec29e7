//! Domain model for desktop layout reorganization.
//!
//! # Responsibility
//! - Define desktop items/screens as read from the launcher store.
//! - Define the external category mapping and the in-memory layout plan.
//!
//! # Invariants
//! - Items keep every column they were read with.
//! - A `LayoutPlan` exists only in memory for the duration of one run.

pub mod item;
pub mod mapping;
pub mod plan;
