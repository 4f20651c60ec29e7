//! Layout markup documents rendered from committed rows.
//!
//! # Responsibility
//! - Render the workspace and drawer layout documents from item and screen
//!   rows.
//! - Read a rendered document back into element counts for verification.
//!
//! # Invariants
//! - Every attribute is derived from relational rows; nothing is carried
//!   over from a previous document.
//! - A folder child's `screenId` comes from its parent folder's screen, not
//!   from the child's own `screen` (always 0 inside a folder).
//! - Dock items use page id 999; every other page id is `1000 + screen`.

use crate::model::item::{Container, DesktopItem, ItemId, ItemKind, Screen, ROOT_CONTAINER};
use crate::service::backup_reader::{BackupLocation, DRAWER_MARKUP_FILE, WORKSPACE_MARKUP_FILE};
use log::info;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use rusqlite::types::Value;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const DOCK_PAGE_ID: i64 = 999;
pub const PAGE_ID_BASE: i64 = 1000;

const DB_VERSION: &str = "85";
const MIN_DOWNGRADE_VERSION: &str = "28";

/// Fixed drawer category order expected by the launcher.
const DRAWER_CATEGORY_ORDER: &[(&str, &str)] = &[
    ("other", "11"),
    ("communicate", "1"),
    ("education", "10"),
    ("entertainment", "4"),
    ("work", "9"),
    ("suggestion", "0"),
    ("games", "6"),
    ("health", "8"),
    ("travel", "7"),
    ("tools", "2"),
    ("photos", "3"),
    ("shopping", "5"),
];

pub type MarkupResult<T> = Result<T, MarkupError>;

#[derive(Debug)]
pub enum MarkupError {
    Render(String),
    Parse { path: PathBuf, message: String },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for MarkupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Render(message) => write!(f, "failed to render layout markup: {message}"),
            Self::Parse { path, message } => {
                write!(f, "failed to parse {}: {message}", path.display())
            }
            Self::Io { path, source } => write!(f, "i/o error at {}: {source}", path.display()),
        }
    }
}

impl Error for MarkupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Render(_) | Self::Parse { .. } => None,
        }
    }
}

fn render_error(err: impl Display) -> MarkupError {
    MarkupError::Render(err.to_string())
}

/// The two layout documents the launcher reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupDocument {
    Workspace,
    /// Same content plus the drawer mode settings block.
    Drawer,
}

impl MarkupDocument {
    pub const ALL: [MarkupDocument; 2] = [Self::Workspace, Self::Drawer];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Workspace => WORKSPACE_MARKUP_FILE,
            Self::Drawer => DRAWER_MARKUP_FILE,
        }
    }

    pub fn path_in(self, location: &BackupLocation) -> PathBuf {
        match self {
            Self::Workspace => location.workspace_markup_path(),
            Self::Drawer => location.drawer_markup_path(),
        }
    }
}

/// Page identifier written for one item.
///
/// `folder_screens` maps folder ids to their home screen.
pub fn page_id(item: &DesktopItem, folder_screens: &HashMap<ItemId, i64>) -> i64 {
    match item.container {
        Container::Dock => DOCK_PAGE_ID,
        Container::Folder(parent) => {
            PAGE_ID_BASE + folder_screens.get(&parent).copied().unwrap_or(item.screen)
        }
        Container::Root | Container::Other(_) => PAGE_ID_BASE + item.screen,
    }
}

/// Screen of every folder row, keyed by folder id.
pub fn folder_screens(items: &[DesktopItem]) -> HashMap<ItemId, i64> {
    items
        .iter()
        .filter(|item| item.kind == ItemKind::Folder)
        .map(|item| (item.id, item.screen))
        .collect()
}

/// Renders one layout document.
pub fn render_document(
    document: MarkupDocument,
    items: &[DesktopItem],
    screens: &[Screen],
) -> MarkupResult<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))
        .map_err(render_error)?;

    let mut layout = BytesStart::new("LAYOUT");
    layout.push_attribute(("dbVersion", DB_VERSION));
    layout.push_attribute(("minDowngradeVersion", MIN_DOWNGRADE_VERSION));
    layout.push_attribute(("isExpVersion", "false"));
    writer.write_event(Event::Start(layout)).map_err(render_error)?;

    if document == MarkupDocument::Drawer {
        write_drawer_settings(&mut writer)?;
    }
    write_empty(
        &mut writer,
        "MODE_PARAMETERS",
        &[("cellCountX", "4".into()), ("cellCountY", "6".into())],
    )?;

    write_group(&mut writer, "SCREENS", screens.iter().enumerate(), |writer, (index, screen)| {
        let index = index as i64;
        write_empty(
            writer,
            "screen",
            &[
                ("_id", (index + 1).to_string()),
                ("screenId", (PAGE_ID_BASE + index).to_string()),
                ("screenNum", index.to_string()),
                ("new_id", index.to_string()),
                ("screenRank", screen.rank.to_string()),
            ],
        )
    })?;

    let parent_screens = folder_screens(items);
    write_group(
        &mut writer,
        "APPLICATIONS",
        items.iter().filter(|item| item.kind.is_application_like()),
        |writer, item| write_empty(writer, "application", &application_attributes(item, &parent_screens)),
    )?;
    write_group(
        &mut writer,
        "FOLDERS",
        items.iter().filter(|item| item.kind == ItemKind::Folder),
        |writer, item| write_empty(writer, "folder", &folder_attributes(item)),
    )?;
    write_group(
        &mut writer,
        "WIDGETS",
        items.iter().filter(|item| item.kind == ItemKind::Widget),
        |writer, item| write_empty(writer, "widget", &widget_attributes(item)),
    )?;
    write_group(
        &mut writer,
        "CARD",
        items.iter().filter(|item| item.kind == ItemKind::Card),
        |writer, item| write_empty(writer, "card", &card_attributes(item)),
    )?;

    writer
        .write_event(Event::End(BytesEnd::new("LAYOUT")))
        .map_err(render_error)?;
    Ok(writer.into_inner())
}

/// Summary of the two documents written by `write_layout_documents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupWriteSummary {
    pub paths: Vec<PathBuf>,
    pub applications: usize,
    pub folders: usize,
}

/// Writes both layout documents into the backup layout directory.
pub fn write_layout_documents(
    location: &BackupLocation,
    items: &[DesktopItem],
    screens: &[Screen],
) -> MarkupResult<MarkupWriteSummary> {
    let mut paths = Vec::with_capacity(MarkupDocument::ALL.len());
    for document in MarkupDocument::ALL {
        let bytes = render_document(document, items, screens)?;
        let path = document.path_in(location);
        std::fs::write(&path, bytes).map_err(|source| MarkupError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            "event=markup_write module=markup status=ok file={}",
            document.file_name()
        );
        paths.push(path);
    }

    Ok(MarkupWriteSummary {
        paths,
        applications: items
            .iter()
            .filter(|item| item.kind.is_application_like())
            .count(),
        folders: items
            .iter()
            .filter(|item| item.kind == ItemKind::Folder)
            .count(),
    })
}

/// `screenId` written for one folder child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderChildPage {
    pub id: ItemId,
    pub container: ItemId,
    pub page_id: i64,
}

/// Element counts read back from a layout document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupSummary {
    pub screens: usize,
    pub applications: usize,
    pub folders: usize,
    pub widgets: usize,
    pub cards: usize,
    pub folder_child_pages: Vec<FolderChildPage>,
}

/// Reads element counts and folder-child page ids from a document.
pub fn read_summary(path: &Path) -> MarkupResult<MarkupSummary> {
    let text = std::fs::read_to_string(path).map_err(|source| MarkupError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_summary(&text).map_err(|message| MarkupError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_summary(text: &str) -> Result<MarkupSummary, String> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut summary = MarkupSummary::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"screen" => summary.screens += 1,
                b"folder" => summary.folders += 1,
                b"widget" => summary.widgets += 1,
                b"card" => summary.cards += 1,
                b"application" => {
                    summary.applications += 1;
                    let mut id = None;
                    let mut container = None;
                    let mut page = None;
                    for attr in e.attributes() {
                        let attr = attr.map_err(|err| format!("attribute error: {err}"))?;
                        let slot = match attr.key.as_ref() {
                            b"_id" => &mut id,
                            b"container" => &mut container,
                            b"screenId" => &mut page,
                            _ => continue,
                        };
                        let raw = String::from_utf8_lossy(&attr.value);
                        *slot = Some(
                            raw.parse::<i64>()
                                .map_err(|_| format!("invalid number: {raw}"))?,
                        );
                    }
                    if let (Some(id), Some(container), Some(page_id)) = (id, container, page) {
                        if container >= 0 {
                            summary.folder_child_pages.push(FolderChildPage {
                                id,
                                container,
                                page_id,
                            });
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(format!(
                    "xml error at position {}: {err}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(summary)
}

type Attributes = [(&'static str, String)];

fn write_empty(writer: &mut Writer<Vec<u8>>, name: &str, attributes: &Attributes) -> MarkupResult<()> {
    let mut element = BytesStart::new(name);
    for (key, value) in attributes {
        element.push_attribute((*key, value.as_str()));
    }
    writer.write_event(Event::Empty(element)).map_err(render_error)
}

fn write_group<I, F>(writer: &mut Writer<Vec<u8>>, name: &str, entries: I, mut write_entry: F) -> MarkupResult<()>
where
    I: IntoIterator,
    F: FnMut(&mut Writer<Vec<u8>>, I::Item) -> MarkupResult<()>,
{
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(render_error)?;
    for entry in entries {
        write_entry(writer, entry)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(render_error)
}

fn write_drawer_settings(writer: &mut Writer<Vec<u8>>) -> MarkupResult<()> {
    let mut settings = BytesStart::new("DRAWER_MODE_SETTING");
    settings.push_attribute(("show_indicate_app", "true"));
    settings.push_attribute(("add_app_to_workspace", "true"));
    settings.push_attribute(("drawer_layout_columns", "4"));
    settings.push_attribute(("drawer_default_page_view", "0"));
    writer.write_event(Event::Start(settings)).map_err(render_error)?;
    for (category, order) in DRAWER_CATEGORY_ORDER {
        write_empty(
            writer,
            "CATEGORY_ORDER",
            &[("category", (*category).into()), ("order", (*order).into())],
        )?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("DRAWER_MODE_SETTING")))
        .map_err(render_error)
}

fn application_attributes(
    item: &DesktopItem,
    folder_screens: &HashMap<ItemId, i64>,
) -> Vec<(&'static str, String)> {
    let (package, class) = item.component().unwrap_or(("", ""));
    let container = item.container.raw();
    let new_screen = match item.container {
        Container::Folder(_) => 0,
        _ => item.screen,
    };
    vec![
        ("_id", item.id.to_string()),
        ("title", item.title.clone().unwrap_or_default()),
        ("packageName", package.to_string()),
        ("className", class.to_string()),
        ("container", container.to_string()),
        ("screenId", page_id(item, folder_screens).to_string()),
        ("screen", item.screen.to_string()),
        ("cellX", item.cell_x.to_string()),
        ("cellY", item.cell_y.to_string()),
        ("new_container", container.to_string()),
        ("new_screen", new_screen.to_string()),
        ("new_cellX", item.cell_x.to_string()),
        ("new_cellY", item.cell_y.to_string()),
        ("new_rank", item.rank.to_string()),
        ("curSpanX", "1".into()),
        ("curSpanY", "1".into()),
        ("spanX", "1".into()),
        ("spanY", "1".into()),
        ("rank", item.rank.to_string()),
        ("user_id", item.user_id.to_string()),
        ("intent", item.intent.clone().unwrap_or_default()),
        ("restored", extra_display(item, "restored", "0")),
        ("profileId", extra_display(item, "profileId", "0")),
        ("options", extra_display(item, "options", "0")),
    ]
}

fn folder_attributes(item: &DesktopItem) -> Vec<(&'static str, String)> {
    let screen = item.screen.to_string();
    vec![
        ("_id", item.id.to_string()),
        ("title", item.title.clone().unwrap_or_default()),
        ("container", ROOT_CONTAINER.to_string()),
        ("screenId", (PAGE_ID_BASE + item.screen).to_string()),
        ("screen", screen.clone()),
        ("cellX", item.cell_x.to_string()),
        ("cellY", item.cell_y.to_string()),
        ("new_container", ROOT_CONTAINER.to_string()),
        ("new_screen", screen),
        ("new_cellX", item.cell_x.to_string()),
        ("new_cellY", item.cell_y.to_string()),
        ("new_rank", "0".into()),
        ("curSpanX", "1".into()),
        ("curSpanY", "1".into()),
        ("spanX", "1".into()),
        ("spanY", "1".into()),
        ("recommendId", extra_display(item, "recommendId", "-1")),
        ("options", extra_display(item, "options", "0")),
    ]
}

fn widget_attributes(item: &DesktopItem) -> Vec<(&'static str, String)> {
    let provider = item.app_widget_provider.clone().unwrap_or_default();
    let (package, class) = provider.split_once('/').unwrap_or(("", ""));
    vec![
        ("_id", item.id.to_string()),
        ("intent", package.to_string()),
        ("packageName", package.to_string()),
        ("className", class.to_string()),
        ("container", ROOT_CONTAINER.to_string()),
        ("screenId", PAGE_ID_BASE.to_string()),
        ("screen", "0".into()),
        ("cellX", item.cell_x.to_string()),
        ("cellY", item.cell_y.to_string()),
        ("new_container", ROOT_CONTAINER.to_string()),
        ("new_screen", "0".into()),
        ("new_cellX", item.cell_x.to_string()),
        ("new_cellY", item.cell_y.to_string()),
        ("new_rank", "0".into()),
        ("spanX", item.span_x.to_string()),
        ("spanY", item.span_y.to_string()),
        ("appWidgetId", item.app_widget_id.to_string()),
        ("restored", "0".into()),
        ("appWidgetProvider", provider.clone()),
    ]
}

fn card_attributes(item: &DesktopItem) -> Vec<(&'static str, String)> {
    vec![
        ("_id", item.id.to_string()),
        ("title", item.title.clone().unwrap_or_default()),
        ("container", ROOT_CONTAINER.to_string()),
        ("screenId", PAGE_ID_BASE.to_string()),
        ("screen", "0".into()),
        ("cellX", item.cell_x.to_string()),
        ("cellY", item.cell_y.to_string()),
        ("new_container", ROOT_CONTAINER.to_string()),
        ("new_screen", "0".into()),
        ("new_cellX", item.cell_x.to_string()),
        ("new_cellY", item.cell_y.to_string()),
        ("new_rank", "0".into()),
        ("user_id", "0".into()),
        ("spanX", item.span_x.to_string()),
        ("spanY", item.span_y.to_string()),
        ("appWidgetId", item.app_widget_id.to_string()),
        ("card_type", extra_display(item, "card_type", "-1")),
        ("service_id", extra_display(item, "service_id", "")),
        (
            "editable_attributes",
            extra_display(item, "editable_attributes", "0"),
        ),
        (
            "theme_card_identification",
            extra_display(item, "theme_card_identification", "0"),
        ),
        ("card_category", extra_display(item, "card_category", "-1")),
        (
            "appWidgetProvider",
            item.app_widget_provider.clone().unwrap_or_default(),
        ),
    ]
}

fn extra_display(item: &DesktopItem, column: &str, default: &str) -> String {
    match item.extra.get(column) {
        Some(Value::Integer(value)) => value.to_string(),
        Some(Value::Real(value)) => value.to_string(),
        Some(Value::Text(value)) => value.clone(),
        Some(Value::Null) | Some(Value::Blob(_)) | None => default.to_string(),
    }
}
