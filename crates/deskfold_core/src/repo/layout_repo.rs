//! Desktop table repository and SQLite implementation.
//!
//! # Responsibility
//! - Read item and screen rows from whichever table set the store exposes.
//! - Rewrite whole tables as one exclusive delete+insert+commit unit.
//! - Keep the optional `_draw` mirror identical to the working tables.
//!
//! # Invariants
//! - Column sets are probed before the destructive delete begins; a missing
//!   table or required column never leaves a half-rewritten store.
//! - Inserts use only columns present in both the row and the live schema;
//!   absent columns fall back to the table default.
//! - A failed rewrite rolls back; the table keeps its previous contents.

use crate::db::schema::quote_ident;
use crate::db::{detect_schema, ColumnSet, DbError, SchemaVariant};
use crate::model::item::{
    Container, DesktopItem, ItemKind, Screen, COL_CELL_X, COL_CELL_Y, COL_CONTAINER, COL_ID,
    COL_INTENT, COL_ITEM_TYPE, COL_MODIFIED, COL_RANK, COL_SCREEN, COL_SCREEN_RANK, COL_SPAN_X,
    COL_SPAN_Y, COL_TITLE, COL_USER_ID, COL_WIDGET_ID, COL_WIDGET_PROVIDER, ROOT_CONTAINER,
    TYPED_ITEM_COLUMNS,
};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const REQUIRED_ITEM_COLUMNS: &[&str] = &[COL_ID, COL_ITEM_TYPE, COL_CONTAINER];
const REQUIRED_SCREEN_COLUMNS: &[&str] = &[COL_ID];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for desktop table reads and rewrites.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid desktop row: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Item and screen rows of the working table set, ordered by `_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRows {
    pub items: Vec<DesktopItem>,
    pub screens: Vec<Screen>,
}

/// Row counts written by one table-set rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub items_table: &'static str,
    pub items: usize,
    pub screens_table: &'static str,
    pub screens: usize,
}

/// Root-level cell claimed by more than one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementCollision {
    pub screen: i64,
    pub cell_x: i64,
    pub cell_y: i64,
    pub count: i64,
}

/// Repository interface for desktop layout tables.
pub trait LayoutRepository {
    /// Table-set variant detected when the repository was created.
    fn variant(&self) -> SchemaVariant;
    /// Reads item and screen rows from the working tables.
    fn read_rows(&self) -> RepoResult<LayoutRows>;
    /// Verifies every table a commit will touch, without mutating anything.
    fn preflight(&self) -> RepoResult<()>;
    /// Replaces the working tables with `items` and `screens`.
    fn replace_layout(&self, items: &[DesktopItem], screens: &[Screen])
        -> RepoResult<CommitSummary>;
    /// Copies the working tables into the mirror; `None` when no mirror exists.
    fn sync_mirror(&self) -> RepoResult<Option<CommitSummary>>;
    /// Counts rows in one table.
    fn count_rows(&self, table: &str) -> RepoResult<i64>;
    /// Counts working-table items whose folder container does not exist.
    fn count_orphans(&self) -> RepoResult<i64>;
    /// Lists root-level cells claimed more than once.
    fn placement_collisions(&self) -> RepoResult<Vec<PlacementCollision>>;
}

/// SQLite-backed layout repository.
pub struct SqliteLayoutRepository<'conn> {
    conn: &'conn Connection,
    variant: SchemaVariant,
}

impl<'conn> SqliteLayoutRepository<'conn> {
    /// Creates a repository after detecting the store's table-set variant.
    ///
    /// # Errors
    /// - `DbError::SchemaMismatch` when neither table set exists.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let variant = detect_schema(conn)?;
        Ok(Self { conn, variant })
    }
}

impl LayoutRepository for SqliteLayoutRepository<'_> {
    fn variant(&self) -> SchemaVariant {
        self.variant
    }

    fn read_rows(&self) -> RepoResult<LayoutRows> {
        let tables = self.variant.working_tables();
        let items = read_raw_rows(self.conn, tables.items)?
            .into_iter()
            .map(item_from_columns)
            .collect::<RepoResult<Vec<_>>>()?;
        let screens = read_raw_rows(self.conn, tables.screens)?
            .into_iter()
            .map(screen_from_columns)
            .collect::<RepoResult<Vec<_>>>()?;

        info!(
            "event=rows_read module=repo status=ok variant={} items={} screens={}",
            self.variant.as_str(),
            items.len(),
            screens.len()
        );
        Ok(LayoutRows { items, screens })
    }

    fn preflight(&self) -> RepoResult<()> {
        let tables = self.variant.working_tables();
        ColumnSet::probe(self.conn, tables.items)?.require(REQUIRED_ITEM_COLUMNS)?;
        ColumnSet::probe(self.conn, tables.screens)?.require(REQUIRED_SCREEN_COLUMNS)?;
        if let Some(mirror) = self.variant.mirror_tables() {
            ColumnSet::probe(self.conn, mirror.items)?.require(REQUIRED_ITEM_COLUMNS)?;
            ColumnSet::probe(self.conn, mirror.screens)?.require(REQUIRED_SCREEN_COLUMNS)?;
        }
        Ok(())
    }

    fn replace_layout(
        &self,
        items: &[DesktopItem],
        screens: &[Screen],
    ) -> RepoResult<CommitSummary> {
        let started_at = Instant::now();
        let tables = self.variant.working_tables();
        let item_columns = ColumnSet::probe(self.conn, tables.items)?;
        item_columns.require(REQUIRED_ITEM_COLUMNS)?;
        let screen_columns = ColumnSet::probe(self.conn, tables.screens)?;
        screen_columns.require(REQUIRED_SCREEN_COLUMNS)?;

        let item_rows = items.iter().map(item_to_columns).collect::<Vec<_>>();
        let screen_rows = screens.iter().map(screen_to_columns).collect::<Vec<_>>();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Exclusive)?;
        replace_rows(&tx, &item_columns, &item_rows)?;
        replace_rows(&tx, &screen_columns, &screen_rows)?;
        tx.commit()?;

        info!(
            "event=table_rewrite module=repo status=ok table={} items={} screens={} duration_ms={}",
            tables.items,
            item_rows.len(),
            screen_rows.len(),
            started_at.elapsed().as_millis()
        );
        Ok(CommitSummary {
            items_table: tables.items,
            items: item_rows.len(),
            screens_table: tables.screens,
            screens: screen_rows.len(),
        })
    }

    fn sync_mirror(&self) -> RepoResult<Option<CommitSummary>> {
        let Some(mirror) = self.variant.mirror_tables() else {
            info!("event=mirror_sync module=repo status=skipped reason=no_mirror_tables");
            return Ok(None);
        };
        let source = self.variant.working_tables();

        let item_rows = read_raw_rows(self.conn, source.items)?;
        let screen_rows = read_raw_rows(self.conn, source.screens)?;
        let item_columns = ColumnSet::probe(self.conn, mirror.items)?;
        item_columns.require(REQUIRED_ITEM_COLUMNS)?;
        let screen_columns = ColumnSet::probe(self.conn, mirror.screens)?;
        screen_columns.require(REQUIRED_SCREEN_COLUMNS)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Exclusive)?;
        replace_rows(&tx, &item_columns, &item_rows)?;
        replace_rows(&tx, &screen_columns, &screen_rows)?;
        tx.commit()?;

        info!(
            "event=mirror_sync module=repo status=ok table={} items={} screens={}",
            mirror.items,
            item_rows.len(),
            screen_rows.len()
        );
        Ok(Some(CommitSummary {
            items_table: mirror.items,
            items: item_rows.len(),
            screens_table: mirror.screens,
            screens: screen_rows.len(),
        }))
    }

    fn count_rows(&self, table: &str) -> RepoResult<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {};", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_orphans(&self) -> RepoResult<i64> {
        let table = quote_ident(self.variant.working_tables().items);
        let count = self.conn.query_row(
            &format!(
                "SELECT COUNT(*)
                 FROM {table} child
                 WHERE child.container >= 0
                   AND NOT EXISTS (
                       SELECT 1 FROM {table} parent
                       WHERE parent._id = child.container AND parent.itemType = ?1
                   );"
            ),
            [ItemKind::Folder.code()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn placement_collisions(&self) -> RepoResult<Vec<PlacementCollision>> {
        let table = quote_ident(self.variant.working_tables().items);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT screen, cellX, cellY, COUNT(*) AS claims
             FROM {table}
             WHERE container = ?1
             GROUP BY screen, cellX, cellY
             HAVING claims > 1
             ORDER BY screen, cellY, cellX;"
        ))?;
        let collisions = stmt
            .query_map([ROOT_CONTAINER], |row| {
                Ok(PlacementCollision {
                    screen: row.get(0)?,
                    cell_x: row.get(1)?,
                    cell_y: row.get(2)?,
                    count: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(collisions)
    }
}

type RawRow = Vec<(String, Value)>;

fn read_raw_rows(conn: &Connection, table: &str) -> RepoResult<Vec<RawRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT * FROM {} ORDER BY {};",
        quote_ident(table),
        quote_ident(COL_ID)
    ))?;
    let names = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(names.len());
        for (index, name) in names.iter().enumerate() {
            values.push((name.clone(), row.get::<_, Value>(index)?));
        }
        out.push(values);
    }
    Ok(out)
}

fn replace_rows(tx: &Transaction<'_>, columns: &ColumnSet, rows: &[RawRow]) -> RepoResult<()> {
    let table = quote_ident(columns.table());
    tx.execute(&format!("DELETE FROM {table};"), [])?;

    for row in rows {
        let projected = columns.project(row);
        if projected.is_empty() {
            return Err(RepoError::InvalidData(format!(
                "row shares no columns with table `{}`",
                columns.table()
            )));
        }
        let names = projected
            .iter()
            .map(|(name, _)| quote_ident(name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=projected.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt =
            tx.prepare_cached(&format!("INSERT INTO {table} ({names}) VALUES ({placeholders});"))?;
        stmt.execute(params_from_iter(projected.iter().map(|(_, value)| *value)))?;
    }
    Ok(())
}

fn item_from_columns(row: RawRow) -> RepoResult<DesktopItem> {
    let mut typed = HashMap::<String, Value>::new();
    let mut extra = BTreeMap::new();
    for (name, value) in row {
        if TYPED_ITEM_COLUMNS.contains(&name.as_str()) {
            typed.insert(name, value);
        } else {
            extra.insert(name, value);
        }
    }

    let id = required_int(&typed, COL_ID)?;
    let kind = ItemKind::from_code(required_int(&typed, COL_ITEM_TYPE)?);
    let container = Container::from_raw(required_int(&typed, COL_CONTAINER)?);

    let mut item = DesktopItem::new(id, kind, container);
    item.screen = int_or(&typed, COL_SCREEN, 0)?;
    item.cell_x = int_or(&typed, COL_CELL_X, 0)?;
    item.cell_y = int_or(&typed, COL_CELL_Y, 0)?;
    item.span_x = int_or(&typed, COL_SPAN_X, 1)?;
    item.span_y = int_or(&typed, COL_SPAN_Y, 1)?;
    item.rank = int_or(&typed, COL_RANK, 0)?;
    item.intent = text_or_none(&typed, COL_INTENT)?;
    item.title = text_or_none(&typed, COL_TITLE)?;
    item.user_id = int_or(&typed, COL_USER_ID, 0)?;
    item.app_widget_provider = text_or_none(&typed, COL_WIDGET_PROVIDER)?;
    item.app_widget_id = int_or(&typed, COL_WIDGET_ID, -1)?;
    item.modified = int_or(&typed, COL_MODIFIED, 0)?;
    item.extra = extra;
    Ok(item)
}

/// Flattens an item back into `(column, value)` pairs.
pub fn item_to_columns(item: &DesktopItem) -> RawRow {
    let mut row = vec![
        (COL_ID.to_string(), Value::Integer(item.id)),
        (COL_ITEM_TYPE.to_string(), Value::Integer(item.kind.code())),
        (COL_CONTAINER.to_string(), Value::Integer(item.container.raw())),
        (COL_SCREEN.to_string(), Value::Integer(item.screen)),
        (COL_CELL_X.to_string(), Value::Integer(item.cell_x)),
        (COL_CELL_Y.to_string(), Value::Integer(item.cell_y)),
        (COL_SPAN_X.to_string(), Value::Integer(item.span_x)),
        (COL_SPAN_Y.to_string(), Value::Integer(item.span_y)),
        (COL_RANK.to_string(), Value::Integer(item.rank)),
        (COL_INTENT.to_string(), optional_text(item.intent.as_deref())),
        (COL_TITLE.to_string(), optional_text(item.title.as_deref())),
        (COL_USER_ID.to_string(), Value::Integer(item.user_id)),
        (
            COL_WIDGET_PROVIDER.to_string(),
            optional_text(item.app_widget_provider.as_deref()),
        ),
        (COL_WIDGET_ID.to_string(), Value::Integer(item.app_widget_id)),
        (COL_MODIFIED.to_string(), Value::Integer(item.modified)),
    ];
    row.extend(
        item.extra
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );
    row
}

fn screen_from_columns(row: RawRow) -> RepoResult<Screen> {
    let typed = row.into_iter().collect::<HashMap<_, _>>();
    let id = required_int(&typed, COL_ID)?;
    Ok(Screen {
        id,
        rank: int_or(&typed, COL_SCREEN_RANK, id)?,
        modified: int_or(&typed, COL_MODIFIED, 0)?,
    })
}

fn screen_to_columns(screen: &Screen) -> RawRow {
    vec![
        (COL_ID.to_string(), Value::Integer(screen.id)),
        (COL_SCREEN_RANK.to_string(), Value::Integer(screen.rank)),
        (COL_MODIFIED.to_string(), Value::Integer(screen.modified)),
    ]
}

fn required_int(columns: &HashMap<String, Value>, column: &str) -> RepoResult<i64> {
    match columns.get(column) {
        Some(Value::Integer(value)) => Ok(*value),
        Some(other) => Err(RepoError::InvalidData(format!(
            "column `{column}` holds non-integer value {other:?}"
        ))),
        None => Err(RepoError::InvalidData(format!(
            "required column `{column}` is missing"
        ))),
    }
}

fn int_or(columns: &HashMap<String, Value>, column: &str, default: i64) -> RepoResult<i64> {
    match columns.get(column) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Integer(value)) => Ok(*value),
        Some(other) => Err(RepoError::InvalidData(format!(
            "column `{column}` holds non-integer value {other:?}"
        ))),
    }
}

fn text_or_none(columns: &HashMap<String, Value>, column: &str) -> RepoResult<Option<String>> {
    match columns.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(value)) => Ok(Some(value.clone())),
        Some(Value::Integer(value)) => Ok(Some(value.to_string())),
        Some(other) => Err(RepoError::InvalidData(format!(
            "column `{column}` holds non-text value {other:?}"
        ))),
    }
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}
