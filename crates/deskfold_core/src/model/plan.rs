//! In-memory layout plan produced by planning and allocation.
//!
//! # Invariants
//! - `items` is the complete row set the primary commit writes.
//! - Root-level items occupy unique `(screen, cell_x, cell_y)` triples.
//! - `screen_count` is one past the highest root-level virtual screen.

use super::item::{DesktopItem, ItemId, Screen};

/// Ordered list of apps assigned to one category label.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBucket {
    pub label: String,
    pub apps: Vec<DesktopItem>,
}

/// Where one category folder landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPlacement {
    pub id: ItemId,
    pub label: String,
    pub screen: i64,
    pub cell_x: i64,
    pub cell_y: i64,
    pub child_count: usize,
}

/// Final layout for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    /// Unmapped screen-0 apps kept at their original cells.
    pub retained: Vec<DesktopItem>,
    /// Buckets in final folder order, holding the apps as read.
    pub buckets: Vec<CategoryBucket>,
    pub folders: Vec<FolderPlacement>,
    /// Every row to write, dock/widgets/cards included.
    pub items: Vec<DesktopItem>,
    pub screens: Vec<Screen>,
    pub screen_count: i64,
    /// Timestamp stamped on every rewritten row.
    pub modified: i64,
    /// Apps left out because their launch descriptor names no package.
    pub skipped_without_package: usize,
}

impl LayoutPlan {
    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn app_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.kind.is_application_like())
            .count()
    }
}
