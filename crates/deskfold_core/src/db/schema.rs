//! Desktop table-set detection and live column probing.
//!
//! # Responsibility
//! - Decide which of the firmware table-set variants a store exposes.
//! - Capture a table's live column list as an explicit capability set.
//!
//! # Invariants
//! - `PrimaryAndMirror` always works on the primary set and treats the
//!   `_draw` set as a mirror that must match it row for row.
//! - `MirrorOnly` stores are read and written through the `_draw` set and
//!   have no mirror to keep in sync.

use super::{DbError, DbResult};
use rusqlite::types::Value;
use rusqlite::Connection;

pub const PRIMARY_ITEMS_TABLE: &str = "singledesktopitems";
pub const PRIMARY_SCREENS_TABLE: &str = "singledesktopscreens";
pub const MIRROR_ITEMS_TABLE: &str = "singledesktopitems_draw";
pub const MIRROR_SCREENS_TABLE: &str = "singledesktopscreens_draw";

/// One items table plus its screens table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSet {
    pub items: &'static str,
    pub screens: &'static str,
}

const PRIMARY_SET: TableSet = TableSet {
    items: PRIMARY_ITEMS_TABLE,
    screens: PRIMARY_SCREENS_TABLE,
};

const MIRROR_SET: TableSet = TableSet {
    items: MIRROR_ITEMS_TABLE,
    screens: MIRROR_SCREENS_TABLE,
};

/// Which desktop table sets a store exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVariant {
    /// Only the primary set exists.
    PrimaryOnly,
    /// Only the `_draw` set exists (newer backups).
    MirrorOnly,
    /// Both exist; the mirror must be rewritten after the primary.
    PrimaryAndMirror,
}

impl SchemaVariant {
    /// Tables read from and rewritten by the primary commit.
    pub fn working_tables(self) -> TableSet {
        match self {
            Self::PrimaryOnly | Self::PrimaryAndMirror => PRIMARY_SET,
            Self::MirrorOnly => MIRROR_SET,
        }
    }

    /// Tables that must mirror the working set, when present.
    pub fn mirror_tables(self) -> Option<TableSet> {
        match self {
            Self::PrimaryAndMirror => Some(MIRROR_SET),
            Self::PrimaryOnly | Self::MirrorOnly => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryOnly => "primary_only",
            Self::MirrorOnly => "mirror_only",
            Self::PrimaryAndMirror => "primary_and_mirror",
        }
    }
}

/// Detects the table-set variant by inspecting `sqlite_master`.
///
/// Presence is decided by the items table of each set.
pub fn detect_schema(conn: &Connection) -> DbResult<SchemaVariant> {
    let tables = list_tables(conn)?;
    let has_primary = tables.iter().any(|name| name == PRIMARY_ITEMS_TABLE);
    let has_mirror = tables.iter().any(|name| name == MIRROR_ITEMS_TABLE);

    match (has_primary, has_mirror) {
        (true, true) => Ok(SchemaVariant::PrimaryAndMirror),
        (true, false) => Ok(SchemaVariant::PrimaryOnly),
        (false, true) => Ok(SchemaVariant::MirrorOnly),
        (false, false) => Err(DbError::SchemaMismatch { tables }),
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn list_tables(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name;")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Live column list of one table, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    table: String,
    columns: Vec<String>,
}

impl ColumnSet {
    /// Reads the live column list of `table`.
    ///
    /// # Errors
    /// - `DbError::MissingTable` when the table does not exist.
    pub fn probe(conn: &Connection, table: &str) -> DbResult<Self> {
        if !table_exists(conn, table)? {
            return Err(DbError::MissingTable(table.to_string()));
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_ident(table)))?;
        let mut rows = stmt.query([])?;
        let mut columns = Vec::new();
        while let Some(row) = rows.next()? {
            columns.push(row.get::<_, String>(1)?);
        }

        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|current| current == column)
    }

    /// Fails when any of `required` is absent.
    pub fn require(&self, required: &[&str]) -> DbResult<()> {
        for column in required {
            if !self.contains(column) {
                return Err(DbError::MissingColumn {
                    table: self.table.clone(),
                    column: (*column).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Keeps only the row values whose column exists in this table.
    ///
    /// Output follows the live column order so generated statements stay
    /// stable for identical row shapes.
    pub fn project<'row>(&self, row: &'row [(String, Value)]) -> Vec<(&'row str, &'row Value)> {
        self.columns
            .iter()
            .filter_map(|column| {
                row.iter()
                    .find(|(name, _)| name == column)
                    .map(|(name, value)| (name.as_str(), value))
            })
            .collect()
    }
}

/// Quotes an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
