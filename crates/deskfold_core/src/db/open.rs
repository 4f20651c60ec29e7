//! Connection bootstrap utilities for the launcher store.
//!
//! # Responsibility
//! - Open an existing store file for reading or exclusive rewriting.
//! - Configure the busy timeout shared by every stage.
//!
//! # Invariants
//! - A missing store file is an error; connections never create one.
//! - Connections are scoped to one stage and dropped on every exit path.

use super::DbResult;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

/// Opens an existing store file for read/write access.
///
/// # Side effects
/// - Emits `store_open` logging events with duration and status.
pub fn open_store(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with_flags(
        path.as_ref(),
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        "read_write",
    )
}

/// Opens an existing store file without write access.
pub fn open_store_read_only(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with_flags(
        path.as_ref(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        "read_only",
    )
}

fn open_with_flags(path: &Path, flags: OpenFlags, mode: &str) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=store_open module=db status=start mode={mode}");

    let conn = match Connection::open_with_flags(path, flags) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=store_open module=db status=error mode={} duration_ms={} error_code=store_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    conn.busy_timeout(Duration::from_secs(5))?;
    info!(
        "event=store_open module=db status=ok mode={} duration_ms={}",
        mode,
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}
