#![allow(dead_code)]

use deskfold_core::RunConfig;
use rusqlite::{params, Connection};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const TIMESTAMP: &str = "20240315_101500";
pub const STORE_RELATIVE: &str = "data/data/com.android.launcher/databases/launcher.db";
pub const MODIFIED: i64 = 1_710_000_000_000;

pub const MAPPING_JSON: &str = r#"{
  "category_order": ["Productivity", "Games"],
  "app_categories": {
    "com.example.mail": "Productivity",  // Mail
    "com.games.chess": "Games"
  },
  "unclassified": ["com.example.weather"]
}"#;

/// Which desktop table sets a fixture store gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tables {
    Primary,
    PrimaryAndMirror,
    MirrorOnly,
}

pub fn create_layout_tables(conn: &Connection, items: &str, screens: &str) {
    conn.execute_batch(&format!(
        "CREATE TABLE {items} (
            _id INTEGER PRIMARY KEY,
            title TEXT,
            intent TEXT,
            container INTEGER,
            screen INTEGER,
            cellX INTEGER,
            cellY INTEGER,
            spanX INTEGER,
            spanY INTEGER,
            itemType INTEGER,
            appWidgetId INTEGER NOT NULL DEFAULT -1,
            appWidgetProvider TEXT,
            modified INTEGER NOT NULL DEFAULT 0,
            restored INTEGER NOT NULL DEFAULT 0,
            rank INTEGER NOT NULL DEFAULT 0,
            options INTEGER NOT NULL DEFAULT 0,
            user_id INTEGER,
            profileId INTEGER DEFAULT 0
         );
         CREATE TABLE {screens} (
            _id INTEGER PRIMARY KEY,
            screenRank INTEGER,
            modified INTEGER NOT NULL DEFAULT 0
         );"
    ))
    .unwrap();
}

fn intent(package: &str) -> String {
    format!("#Intent;action=android.intent.action.MAIN;component={package}/.Main;end")
}

#[allow(clippy::too_many_arguments)]
pub fn insert_item(
    conn: &Connection,
    table: &str,
    id: i64,
    item_type: i64,
    title: &str,
    package: Option<&str>,
    container: i64,
    (screen, cell_x, cell_y): (i64, i64, i64),
) {
    conn.execute(
        &format!(
            "INSERT INTO {table}
                (_id, title, intent, container, screen, cellX, cellY, spanX, spanY, itemType, user_id, options)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 1, ?8, 0, 4);"
        ),
        params![
            id,
            title,
            package.map(intent),
            container,
            screen,
            cell_x,
            cell_y,
            item_type
        ],
    )
    .unwrap();
}

/// Dock, widget, legacy folder, a duplicate and mapped/unmapped apps.
pub fn seed_layout(conn: &Connection, items: &str, screens: &str) {
    insert_item(conn, items, 1, 0, "Phone", Some("com.android.dialer"), -101, (0, 0, 0));
    insert_item(conn, items, 2, 5, "Clock", None, -100, (0, 0, 0));
    conn.execute(
        &format!(
            "UPDATE {items} SET spanX = 4, spanY = 2, appWidgetId = 7,
                appWidgetProvider = 'com.example.clock/.ClockWidget'
             WHERE _id = 2;"
        ),
        [],
    )
    .unwrap();
    insert_item(conn, items, 3, 0, "Mail", Some("com.example.mail"), -100, (0, 1, 3));
    insert_item(conn, items, 4, 0, "Notes", Some("com.example.notes"), -100, (0, 2, 3));
    insert_item(conn, items, 5, 3, "Old", None, -100, (1, 0, 0));
    insert_item(conn, items, 6, 0, "Chess", Some("com.games.chess"), 5, (0, 0, 0));
    insert_item(conn, items, 7, 0, "Mail", Some("com.example.mail"), 5, (0, 1, 0));
    insert_item(conn, items, 8, 0, "Weather", Some("com.example.weather"), -100, (1, 1, 0));
    for screen in 0..2 {
        conn.execute(
            &format!("INSERT INTO {screens} (_id, screenRank) VALUES (?1, ?1);"),
            [screen],
        )
        .unwrap();
    }
}

/// Writes a seeded store at `path`.
pub fn write_store(path: &Path, tables: Tables) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = Connection::open(path).unwrap();
    match tables {
        Tables::Primary => {
            create_layout_tables(&conn, "singledesktopitems", "singledesktopscreens");
            seed_layout(&conn, "singledesktopitems", "singledesktopscreens");
        }
        Tables::PrimaryAndMirror => {
            create_layout_tables(&conn, "singledesktopitems", "singledesktopscreens");
            create_layout_tables(&conn, "singledesktopitems_draw", "singledesktopscreens_draw");
            seed_layout(&conn, "singledesktopitems", "singledesktopscreens");
            // The mirror starts out stale.
            insert_item(&conn, "singledesktopitems_draw", 1, 0, "Phone", Some("com.android.dialer"), -101, (0, 0, 0));
        }
        Tables::MirrorOnly => {
            create_layout_tables(&conn, "singledesktopitems_draw", "singledesktopscreens_draw");
            seed_layout(&conn, "singledesktopitems_draw", "singledesktopscreens_draw");
        }
    }
}

/// Work directory holding one `Data/<timestamp>/Layout` backup.
pub struct BackupFixture {
    pub dir: TempDir,
    pub layout_dir: PathBuf,
    /// Store bytes as they were packed into the archive.
    pub original_store: Vec<u8>,
}

impl BackupFixture {
    pub fn new(tables: Tables) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout_dir = dir.path().join("Data").join(TIMESTAMP).join("Layout");
        fs::create_dir_all(&layout_dir).unwrap();

        let staging = tempfile::tempdir().unwrap();
        let staged_store = staging.path().join(STORE_RELATIVE);
        write_store(&staged_store, tables);
        let original_store = fs::read(&staged_store).unwrap();

        let archive = File::create(layout_dir.join("com.android.launcher.tar")).unwrap();
        let mut builder = tar::Builder::new(archive);
        builder
            .append_dir_all("data", staging.path().join("data"))
            .unwrap();
        builder.into_inner().unwrap();

        fs::write(layout_dir.join("launcher_layout.xml"), b"<LAYOUT />").unwrap();
        fs::write(layout_dir.join("launcher_draw_layout.xml"), b"<LAYOUT />").unwrap();
        fs::write(dir.path().join("app_categories.json"), MAPPING_JSON).unwrap();

        Self {
            dir,
            layout_dir,
            original_store,
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> RunConfig {
        RunConfig::builder(self.work_dir()).build().unwrap()
    }

    pub fn archive_path(&self) -> PathBuf {
        self.layout_dir.join("com.android.launcher.tar")
    }

    pub fn store_path(&self) -> PathBuf {
        self.layout_dir.join(STORE_RELATIVE)
    }
}

/// Member names of a tar archive, in archive order.
pub fn archive_member_names(path: &Path) -> Vec<String> {
    let mut archive = tar::Archive::new(File::open(path).unwrap());
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            String::from_utf8_lossy(&entry.path_bytes()).into_owned()
        })
        .collect()
}

pub fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}
