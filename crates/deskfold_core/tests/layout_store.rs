mod common;

use common::{count_rows, create_layout_tables, insert_item, write_store, Tables, MODIFIED};
use deskfold_core::db::{open_store, DbError, SchemaVariant};
use deskfold_core::service::planner::plan_layout;
use deskfold_core::{
    CategoryMapping, LayoutRepository, RepoError, RunConfig, SqliteLayoutRepository,
};
use rusqlite::types::Value;
use rusqlite::Connection;

fn seeded(tables: Tables) -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("launcher.db");
    write_store(&path, tables);
    let conn = open_store(&path).unwrap();
    (dir, conn)
}

fn planned_rows(
    repo: &SqliteLayoutRepository<'_>,
) -> (Vec<deskfold_core::DesktopItem>, Vec<deskfold_core::Screen>) {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder(dir.path()).build().unwrap();
    let mapping = CategoryMapping::from_json_text(common::MAPPING_JSON).unwrap();
    let rows = repo.read_rows().unwrap();
    let plan = plan_layout(rows.items, &mapping, &config, MODIFIED);
    (plan.items, plan.screens)
}

#[test]
fn mirror_matches_primary_after_commit() {
    let (_dir, conn) = seeded(Tables::PrimaryAndMirror);
    let repo = SqliteLayoutRepository::try_new(&conn).unwrap();
    assert_eq!(repo.variant(), SchemaVariant::PrimaryAndMirror);
    assert_ne!(
        count_rows(&conn, "singledesktopitems"),
        count_rows(&conn, "singledesktopitems_draw")
    );

    let (items, screens) = planned_rows(&repo);
    let primary = repo.replace_layout(&items, &screens).unwrap();
    let mirror = repo.sync_mirror().unwrap().unwrap();

    assert_eq!(primary.items, mirror.items);
    assert_eq!(mirror.items_table, "singledesktopitems_draw");
    assert_eq!(
        count_rows(&conn, "singledesktopitems"),
        count_rows(&conn, "singledesktopitems_draw")
    );
    assert_eq!(
        count_rows(&conn, "singledesktopscreens"),
        count_rows(&conn, "singledesktopscreens_draw")
    );
    assert_eq!(repo.count_orphans().unwrap(), 0);
    assert!(repo.placement_collisions().unwrap().is_empty());
}

#[test]
fn mirror_only_store_is_rewritten_through_draw_tables() {
    let (_dir, conn) = seeded(Tables::MirrorOnly);
    let repo = SqliteLayoutRepository::try_new(&conn).unwrap();
    assert_eq!(repo.variant(), SchemaVariant::MirrorOnly);

    let (items, screens) = planned_rows(&repo);
    let summary = repo.replace_layout(&items, &screens).unwrap();

    assert_eq!(summary.items_table, "singledesktopitems_draw");
    assert!(repo.sync_mirror().unwrap().is_none());
    assert_eq!(
        count_rows(&conn, "singledesktopitems_draw"),
        items.len() as i64
    );
}

#[test]
fn unknown_columns_survive_rewrite() {
    let (_dir, conn) = seeded(Tables::Primary);
    let repo = SqliteLayoutRepository::try_new(&conn).unwrap();

    let rows = repo.read_rows().unwrap();
    let dock = rows.items.iter().find(|item| item.id == 1).unwrap();
    assert_eq!(dock.extra.get("options"), Some(&Value::Integer(4)));

    repo.replace_layout(&rows.items, &rows.screens).unwrap();
    let reread = repo.read_rows().unwrap();
    assert_eq!(reread, rows);
}

#[test]
fn missing_required_column_aborts_before_any_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("launcher.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE singledesktopitems (_id INTEGER PRIMARY KEY, title TEXT, intent TEXT, container INTEGER);
         CREATE TABLE singledesktopscreens (_id INTEGER PRIMARY KEY, screenRank INTEGER);
         INSERT INTO singledesktopitems (_id, title, container) VALUES (1, 'Phone', -101);",
    )
    .unwrap();
    let repo = SqliteLayoutRepository::try_new(&conn).unwrap();

    let err = repo.preflight().unwrap_err();
    assert!(matches!(
        err,
        RepoError::Db(DbError::MissingColumn { ref column, .. }) if column == "itemType"
    ));
    assert!(repo.replace_layout(&[], &[]).is_err());
    assert_eq!(count_rows(&conn, "singledesktopitems"), 1);
}

#[test]
fn mirror_with_missing_screens_table_fails_preflight() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::open(dir.path().join("launcher.db")).unwrap();
    create_layout_tables(&conn, "singledesktopitems", "singledesktopscreens");
    conn.execute_batch("CREATE TABLE singledesktopitems_draw (_id INTEGER, itemType INTEGER, container INTEGER);")
        .unwrap();
    insert_item(&conn, "singledesktopitems", 1, 0, "Phone", Some("com.android.dialer"), -101, (0, 0, 0));
    let repo = SqliteLayoutRepository::try_new(&conn).unwrap();

    assert!(matches!(
        repo.preflight().unwrap_err(),
        RepoError::Db(DbError::MissingTable(ref table)) if table == "singledesktopscreens_draw"
    ));
}

#[test]
fn store_without_desktop_tables_is_a_schema_mismatch() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE favorites (_id INTEGER);").unwrap();

    assert!(matches!(
        SqliteLayoutRepository::try_new(&conn),
        Err(RepoError::Db(DbError::SchemaMismatch { .. }))
    ));
}
