//! Desktop item and screen records.
//!
//! # Responsibility
//! - Give the launcher's flat item table typed structural fields.
//! - Carry every other column through untouched so rewrites stay lossless.
//!
//! # Invariants
//! - `container` values `-100`/`-101` are the root/dock sentinels; values
//!   `>= 0` reference a folder item id.
//! - `extra` never holds a column that also has a typed field.

use rusqlite::types::Value;
use std::collections::BTreeMap;

/// Stable row identifier (`_id`).
pub type ItemId = i64;

pub const ROOT_CONTAINER: i64 = -100;
pub const DOCK_CONTAINER: i64 = -101;

pub const COL_ID: &str = "_id";
pub const COL_ITEM_TYPE: &str = "itemType";
pub const COL_CONTAINER: &str = "container";
pub const COL_SCREEN: &str = "screen";
pub const COL_CELL_X: &str = "cellX";
pub const COL_CELL_Y: &str = "cellY";
pub const COL_SPAN_X: &str = "spanX";
pub const COL_SPAN_Y: &str = "spanY";
pub const COL_RANK: &str = "rank";
pub const COL_INTENT: &str = "intent";
pub const COL_TITLE: &str = "title";
pub const COL_USER_ID: &str = "user_id";
pub const COL_WIDGET_PROVIDER: &str = "appWidgetProvider";
pub const COL_WIDGET_ID: &str = "appWidgetId";
pub const COL_MODIFIED: &str = "modified";

pub const COL_SCREEN_RANK: &str = "screenRank";

/// Columns that map onto typed `DesktopItem` fields.
pub const TYPED_ITEM_COLUMNS: &[&str] = &[
    COL_ID,
    COL_ITEM_TYPE,
    COL_CONTAINER,
    COL_SCREEN,
    COL_CELL_X,
    COL_CELL_Y,
    COL_SPAN_X,
    COL_SPAN_Y,
    COL_RANK,
    COL_INTENT,
    COL_TITLE,
    COL_USER_ID,
    COL_WIDGET_PROVIDER,
    COL_WIDGET_ID,
    COL_MODIFIED,
];

/// Structural kind stored in `itemType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    App,
    Folder,
    Widget,
    Card,
    /// Shortcuts and other launcher-specific types; planned like apps.
    Other(i64),
}

impl ItemKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::App,
            3 => Self::Folder,
            5 => Self::Widget,
            100 => Self::Card,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::App => 0,
            Self::Folder => 3,
            Self::Widget => 5,
            Self::Card => 100,
            Self::Other(code) => code,
        }
    }

    /// Whether markup renders this kind in the applications group.
    pub fn is_application_like(self) -> bool {
        matches!(self, Self::App | Self::Other(_))
    }
}

/// Decoded `container` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Root,
    Dock,
    Folder(ItemId),
    /// Any other negative sentinel the firmware may use.
    Other(i64),
}

impl Container {
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            ROOT_CONTAINER => Self::Root,
            DOCK_CONTAINER => Self::Dock,
            id if id >= 0 => Self::Folder(id),
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> i64 {
        match self {
            Self::Root => ROOT_CONTAINER,
            Self::Dock => DOCK_CONTAINER,
            Self::Folder(id) => id,
            Self::Other(raw) => raw,
        }
    }
}

/// One row of the desktop items table.
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopItem {
    pub id: ItemId,
    pub kind: ItemKind,
    pub container: Container,
    /// Home-screen index for root items; internal page (always 0) for
    /// folder children.
    pub screen: i64,
    pub cell_x: i64,
    pub cell_y: i64,
    pub span_x: i64,
    pub span_y: i64,
    /// Order within a folder.
    pub rank: i64,
    /// Launch descriptor, e.g. `#Intent;...;component=pkg/.Main;end`.
    pub intent: Option<String>,
    pub title: Option<String>,
    /// Profile (user) identifier; part of the dedup key.
    pub user_id: i64,
    pub app_widget_provider: Option<String>,
    pub app_widget_id: i64,
    /// Epoch milliseconds.
    pub modified: i64,
    /// Every other column, keyed by column name.
    pub extra: BTreeMap<String, Value>,
}

impl DesktopItem {
    /// Creates an item with neutral defaults for every typed field.
    pub fn new(id: ItemId, kind: ItemKind, container: Container) -> Self {
        Self {
            id,
            kind,
            container,
            screen: 0,
            cell_x: 0,
            cell_y: 0,
            span_x: 1,
            span_y: 1,
            rank: 0,
            intent: None,
            title: None,
            user_id: 0,
            app_widget_provider: None,
            app_widget_id: -1,
            modified: 0,
            extra: BTreeMap::new(),
        }
    }

    /// Creates a folder row with the platform's default column values.
    pub fn new_folder(id: ItemId, title: impl Into<String>, modified: i64) -> Self {
        let mut folder = Self::new(id, ItemKind::Folder, Container::Root);
        folder.title = Some(title.into());
        folder.modified = modified;
        for (column, value) in FOLDER_DEFAULT_COLUMNS {
            folder.extra.insert((*column).to_string(), value.to_value());
        }
        folder
    }

    /// Returns `(package, class)` parsed from the launch descriptor.
    pub fn component(&self) -> Option<(&str, &str)> {
        parse_component(self.intent.as_deref()?)
    }

    /// Returns the package name parsed from the launch descriptor.
    pub fn package_name(&self) -> Option<&str> {
        self.component().map(|(package, _)| package)
    }

    /// Deduplication key: launch descriptor plus profile identifier.
    pub fn dedup_key(&self) -> Option<(&str, i64)> {
        self.intent.as_deref().map(|intent| (intent, self.user_id))
    }

    pub fn is_root(&self) -> bool {
        self.container == Container::Root
    }

    pub fn extra_i64(&self, column: &str, default: i64) -> i64 {
        match self.extra.get(column) {
            Some(Value::Integer(value)) => *value,
            _ => default,
        }
    }

    pub fn extra_text(&self, column: &str) -> Option<&str> {
        match self.extra.get(column) {
            Some(Value::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// Parses `component=pkg/cls` out of a launch descriptor.
///
/// The component runs up to the next `;`. A component without `/` yields a
/// package with an empty class.
pub fn parse_component(intent: &str) -> Option<(&str, &str)> {
    let (_, tail) = intent.split_once("component=")?;
    let component = tail.split(';').next().unwrap_or_default();
    let (package, class) = component.split_once('/').unwrap_or((component, ""));
    if package.is_empty() {
        return None;
    }
    Some((package, class))
}

/// One row of the desktop screens table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    pub id: i64,
    /// 0-based sequence position.
    pub rank: i64,
    pub modified: i64,
}

#[derive(Debug, Clone, Copy)]
enum DefaultValue {
    Null,
    Int(i64),
}

impl DefaultValue {
    fn to_value(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Int(value) => Value::Integer(value),
        }
    }
}

const FOLDER_DEFAULT_COLUMNS: &[(&str, DefaultValue)] = &[
    ("iconPackage", DefaultValue::Null),
    ("iconResource", DefaultValue::Null),
    ("icon", DefaultValue::Null),
    ("restored", DefaultValue::Int(0)),
    ("profileId", DefaultValue::Int(0)),
    ("options", DefaultValue::Int(0)),
    ("appWidgetSource", DefaultValue::Int(-1)),
    ("iconType", DefaultValue::Null),
    ("card_type", DefaultValue::Int(-1)),
    ("card_host_id", DefaultValue::Int(1)),
    ("service_id", DefaultValue::Null),
    ("card_category", DefaultValue::Int(-1)),
    ("editable_attributes", DefaultValue::Int(0)),
    ("theme_card_identification", DefaultValue::Int(0)),
    ("recommendId", DefaultValue::Int(-1)),
];

#[cfg(test)]
mod tests {
    use super::{parse_component, Container, DesktopItem, ItemKind};

    #[test]
    fn parse_component_splits_package_and_class() {
        let intent = "#Intent;action=android.intent.action.MAIN;component=com.example.mail/.Inbox;end";
        assert_eq!(
            parse_component(intent),
            Some(("com.example.mail", ".Inbox"))
        );
        assert_eq!(parse_component("#Intent;end"), None);
        assert_eq!(
            parse_component("component=com.only.pkg"),
            Some(("com.only.pkg", ""))
        );
    }

    #[test]
    fn container_sentinels_roundtrip() {
        assert_eq!(Container::from_raw(-100), Container::Root);
        assert_eq!(Container::from_raw(-101), Container::Dock);
        assert_eq!(Container::from_raw(42), Container::Folder(42));
        assert_eq!(Container::from_raw(-7).raw(), -7);
    }

    #[test]
    fn new_folder_carries_platform_defaults() {
        let folder = DesktopItem::new_folder(120, " Tools", 5);
        assert_eq!(folder.kind, ItemKind::Folder);
        assert_eq!(folder.extra_i64("card_host_id", 0), 1);
        assert_eq!(folder.extra_i64("recommendId", 0), -1);
        assert_eq!(folder.app_widget_id, -1);
        assert!(folder.is_root());
    }
}
