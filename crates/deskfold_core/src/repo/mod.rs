//! Repository layer over the launcher store.
//!
//! # Responsibility
//! - Define the data access contract for desktop item/screen tables.
//! - Keep SQL text out of planning, writing and verification services.
//!
//! # Invariants
//! - Table rewrites are all-or-nothing.
//! - Repository APIs surface schema problems before any destructive SQL.

pub mod layout_repo;
