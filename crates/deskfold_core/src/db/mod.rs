//! SQLite store bootstrap and schema inspection entry points.
//!
//! # Responsibility
//! - Open the launcher store extracted from a backup.
//! - Detect which desktop table set the firmware exposes.
//! - Probe live column sets before any write.
//!
//! # Invariants
//! - The store schema is dictated by the device; core never migrates it.
//! - Every write stage probes columns at runtime instead of assuming them.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
pub mod schema;

pub use open::{open_store, open_store_read_only};
pub use schema::{detect_schema, ColumnSet, SchemaVariant, TableSet};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Neither the primary nor the mirror desktop table set exists.
    SchemaMismatch {
        tables: Vec<String>,
    },
    /// A table required by the current stage is missing.
    MissingTable(String),
    /// A column required by the current stage is missing.
    MissingColumn {
        table: String,
        column: String,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::SchemaMismatch { tables } => write!(
                f,
                "no desktop table set found in store; existing tables: [{}]",
                tables.join(", ")
            ),
            Self::MissingTable(table) => write!(f, "store is missing table `{table}`"),
            Self::MissingColumn { table, column } => {
                write!(f, "table `{table}` is missing column `{column}`")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::SchemaMismatch { .. } => None,
            Self::MissingTable(_) => None,
            Self::MissingColumn { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
