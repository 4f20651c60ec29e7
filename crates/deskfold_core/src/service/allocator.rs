//! Identifier allocation and grid packing.
//!
//! # Responsibility
//! - Hand out collision-free identifiers for every rewritten row.
//! - Pack category folders into 4x6 virtual screens and children into a
//!   3-column folder grid.
//!
//! # Invariants
//! - Allocation is one monotonic pass starting at `FIRST_ALLOCATED_ID` that
//!   skips identifiers kept by dock, widget and card rows.
//! - Folders start at virtual screen 1; screen 0 holds widgets, cards and
//!   retained icons.
//! - A folder child's own `screen` is its internal page (always 0).

use crate::config::RunConfig;
use crate::model::item::{Container, DesktopItem, ItemId, ItemKind, Screen};
use crate::model::plan::{FolderPlacement, LayoutPlan};
use crate::service::planner::BucketPlan;
use log::info;
use std::collections::HashSet;

/// First identifier above the launcher's reserved low range.
pub const FIRST_ALLOCATED_ID: ItemId = 100;
pub const GRID_COLUMNS: i64 = 4;
pub const GRID_ROWS: i64 = 6;
pub const FOLDER_GRID_COLUMNS: i64 = 3;
pub const PRIMARY_SCREEN: i64 = 0;
pub const FIRST_FOLDER_SCREEN: i64 = 1;

/// Monotonic identifier source.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: ItemId,
    used: HashSet<ItemId>,
}

impl IdAllocator {
    /// Creates an allocator that never returns any of `reserved`.
    pub fn new(reserved: impl IntoIterator<Item = ItemId>) -> Self {
        Self {
            next: FIRST_ALLOCATED_ID,
            used: reserved.into_iter().collect(),
        }
    }

    pub fn allocate(&mut self) -> ItemId {
        while self.used.contains(&self.next) {
            self.next += 1;
        }
        let id = self.next;
        self.used.insert(id);
        self.next += 1;
        id
    }
}

/// One cell on a virtual screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub screen: i64,
    pub cell_x: i64,
    pub cell_y: i64,
}

/// Row-major cursor over consecutive 4x6 virtual screens.
#[derive(Debug, Clone, Copy)]
pub struct GridCursor {
    current: GridCell,
}

impl GridCursor {
    pub fn new(first_screen: i64) -> Self {
        Self {
            current: GridCell {
                screen: first_screen,
                cell_x: 0,
                cell_y: 0,
            },
        }
    }

    /// Returns the current cell and moves to the next one.
    pub fn take(&mut self) -> GridCell {
        let taken = self.current;
        self.current.cell_x += 1;
        if self.current.cell_x >= GRID_COLUMNS {
            self.current.cell_x = 0;
            self.current.cell_y += 1;
            if self.current.cell_y >= GRID_ROWS {
                self.current.cell_y = 0;
                self.current.screen += 1;
            }
        }
        taken
    }
}

/// `(column, row)` of the child at `rank` inside a folder.
pub fn folder_child_cell(rank: i64) -> (i64, i64) {
    (rank % FOLDER_GRID_COLUMNS, rank / FOLDER_GRID_COLUMNS)
}

/// Rows kept with their identifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixedItems {
    pub dock: Vec<DesktopItem>,
    pub widgets: Vec<DesktopItem>,
    pub cards: Vec<DesktopItem>,
}

/// Assigns identifiers and positions, producing the final plan.
pub fn allocate(
    fixed: FixedItems,
    buckets: BucketPlan,
    config: &RunConfig,
    modified: i64,
) -> LayoutPlan {
    let mut items = Vec::new();

    for mut surface in fixed.widgets.into_iter().chain(fixed.cards) {
        surface.screen = PRIMARY_SCREEN;
        items.push(surface);
    }
    items.extend(fixed.dock);

    let mut ids = IdAllocator::new(items.iter().map(|item| item.id));

    let mut retained = Vec::with_capacity(buckets.retained.len());
    for original in buckets.retained {
        let mut kept = original;
        kept.id = ids.allocate();
        kept.kind = ItemKind::App;
        kept.container = Container::Root;
        kept.screen = PRIMARY_SCREEN;
        kept.span_x = 1;
        kept.span_y = 1;
        kept.rank = 0;
        kept.modified = modified;
        retained.push(kept.clone());
        items.push(kept);
    }

    let mut cursor = GridCursor::new(FIRST_FOLDER_SCREEN);
    let mut folders = Vec::with_capacity(buckets.buckets.len());
    for bucket in &buckets.buckets {
        if bucket.apps.is_empty() {
            continue;
        }

        let cell = cursor.take();
        let folder_id = ids.allocate();
        let mut folder = DesktopItem::new_folder(folder_id, config.folder_title(&bucket.label), modified);
        folder.screen = cell.screen;
        folder.cell_x = cell.cell_x;
        folder.cell_y = cell.cell_y;
        items.push(folder);

        for (rank, app) in (0_i64..).zip(&bucket.apps) {
            let (cell_x, cell_y) = folder_child_cell(rank);
            let mut child = app.clone();
            child.id = ids.allocate();
            child.kind = ItemKind::App;
            child.container = Container::Folder(folder_id);
            child.screen = 0;
            child.cell_x = cell_x;
            child.cell_y = cell_y;
            child.span_x = 1;
            child.span_y = 1;
            child.rank = rank;
            child.modified = modified;
            items.push(child);
        }

        folders.push(FolderPlacement {
            id: folder_id,
            label: bucket.label.clone(),
            screen: cell.screen,
            cell_x: cell.cell_x,
            cell_y: cell.cell_y,
            child_count: bucket.apps.len(),
        });
    }

    let screen_count = screen_count(&items);
    let screens = (0..screen_count)
        .map(|index| Screen {
            id: index,
            rank: index,
            modified,
        })
        .collect();

    info!(
        "event=allocate module=allocator status=ok items={} folders={} retained={} screens={}",
        items.len(),
        folders.len(),
        retained.len(),
        screen_count
    );

    LayoutPlan {
        retained,
        buckets: buckets.buckets,
        folders,
        items,
        screens,
        screen_count,
        modified,
        skipped_without_package: buckets.skipped_without_package,
    }
}

/// One past the highest virtual screen used by a root-level item.
pub fn screen_count(items: &[DesktopItem]) -> i64 {
    items
        .iter()
        .filter(|item| item.is_root())
        .map(|item| item.screen)
        .max()
        .unwrap_or(PRIMARY_SCREEN)
        .max(PRIMARY_SCREEN)
        + 1
}
