mod common;

use common::{archive_member_names, count_rows, BackupFixture, Tables, MODIFIED};
use deskfold_core::service::archive::RepackMode;
use deskfold_core::service::markup::read_summary;
use deskfold_core::{
    harvest_app_names, LayoutError, Pipeline, PipelineStage, PipelineWarning, ReorganizeOptions,
    RunConfig,
};
use rusqlite::Connection;
use std::fs;
use std::io::Read;

fn run(config: &RunConfig, dry_run: bool) -> Result<deskfold_core::ReorganizeReport, LayoutError> {
    Pipeline::new(config).reorganize(ReorganizeOptions {
        dry_run,
        modified: Some(MODIFIED),
    })
}

#[test]
fn reorganize_rewrites_store_markup_and_archive_consistently() {
    let fixture = BackupFixture::new(Tables::PrimaryAndMirror);
    let config = fixture.config();
    let mut pipeline = Pipeline::new(&config);

    let report = pipeline
        .reorganize(ReorganizeOptions {
            dry_run: false,
            modified: Some(MODIFIED),
        })
        .unwrap();

    assert_eq!(pipeline.stage(), PipelineStage::Done);
    assert_eq!(report.timestamp, common::TIMESTAMP);
    assert!(report.is_consistent(), "{:?}", report.verification);

    let labels = report
        .plan
        .folders
        .iter()
        .map(|folder| folder.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec!["Productivity", "Games", "Other"]);
    assert_eq!(report.plan.retained.len(), 1);
    assert_eq!(report.plan.retained[0].title.as_deref(), Some("Notes"));
    assert_eq!(report.plan.screen_count, 2);

    let snapshot = report.snapshot.as_ref().unwrap();
    assert_eq!(snapshot.created.len(), 4);
    assert!(report.mirror.is_some());

    let conn = Connection::open(fixture.store_path()).unwrap();
    assert_eq!(
        count_rows(&conn, "singledesktopitems"),
        count_rows(&conn, "singledesktopitems_draw")
    );
    assert_eq!(count_rows(&conn, "singledesktopitems"), 9);
    assert_eq!(count_rows(&conn, "singledesktopscreens"), 2);

    let workspace = read_summary(&fixture.layout_dir.join("launcher_layout.xml")).unwrap();
    assert_eq!(workspace.folders, 3);
    assert_eq!(workspace.applications, 5);
    assert_eq!(workspace.widgets, 1);
    assert_eq!(workspace.folder_child_pages.len(), 3);
    let drawer = fs::read_to_string(fixture.layout_dir.join("launcher_draw_layout.xml")).unwrap();
    assert!(drawer.contains("DRAWER_MODE_SETTING"));

    let archive = report.archive.as_ref().unwrap();
    assert_eq!(archive.mode, RepackMode::Exact);
    assert!(archive.skipped.is_empty());
    assert!(!report
        .warnings
        .iter()
        .any(|warning| matches!(warning, PipelineWarning::PartialArchiveFidelity { .. })));
}

#[test]
fn exact_repack_keeps_reference_member_order_with_new_store_bytes() {
    let fixture = BackupFixture::new(Tables::Primary);
    let reference_names = archive_member_names(&fixture.archive_path());
    let config = fixture.config();

    run(&config, false).unwrap();

    assert_eq!(archive_member_names(&fixture.archive_path()), reference_names);

    let rewritten_store = fs::read(fixture.store_path()).unwrap();
    assert_ne!(rewritten_store, fixture.original_store);
    let mut archive = tar::Archive::new(fs::File::open(fixture.archive_path()).unwrap());
    let mut found = false;
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let header = entry.header();
        assert_eq!(header.uid().unwrap(), 0);
        assert_eq!(header.gid().unwrap(), 0);
        assert_eq!(header.mode().unwrap(), 0);
        if entry.path().unwrap().ends_with("launcher.db") {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).unwrap();
            assert_eq!(bytes, rewritten_store);
            found = true;
        }
    }
    assert!(found);
}

#[test]
fn dry_run_plans_without_touching_the_backup() {
    let fixture = BackupFixture::new(Tables::Primary);
    let archive_before = fs::read(fixture.archive_path()).unwrap();
    let config = fixture.config();

    let report = run(&config, true).unwrap();

    assert!(report.dry_run);
    assert!(report.is_consistent());
    assert_eq!(report.plan.folder_count(), 3);
    assert!(report.snapshot.is_none());
    assert!(report.primary.is_none());
    assert_eq!(fs::read(fixture.archive_path()).unwrap(), archive_before);
    assert_eq!(fs::read(fixture.store_path()).unwrap(), fixture.original_store);
    assert!(!fixture.layout_dir.join("com.android.launcher.tar.bak").exists());
}

#[test]
fn missing_mapping_stops_before_anything_is_written() {
    let fixture = BackupFixture::new(Tables::Primary);
    fs::remove_file(fixture.work_dir().join("app_categories.json")).unwrap();
    let archive_before = fs::read(fixture.archive_path()).unwrap();
    let config = fixture.config();
    let mut pipeline = Pipeline::new(&config);

    let err = pipeline.reorganize(ReorganizeOptions::default()).unwrap_err();

    assert!(matches!(err, LayoutError::NotFound(_)));
    assert_eq!(pipeline.stage(), PipelineStage::Located);
    assert!(pipeline.stage().is_safe_stop());
    assert_eq!(fs::read(fixture.archive_path()).unwrap(), archive_before);
    assert!(!fixture.layout_dir.join("data").exists());
}

#[test]
fn store_without_desktop_tables_is_rejected_before_snapshot() {
    let fixture = BackupFixture::new(Tables::Primary);
    let config = fixture.config();
    run(&config, true).unwrap();
    let conn = Connection::open(fixture.store_path()).unwrap();
    conn.execute_batch(
        "DROP TABLE singledesktopitems;
         DROP TABLE singledesktopscreens;",
    )
    .unwrap();
    drop(conn);
    let mut pipeline = Pipeline::new(&config);

    let err = pipeline.reorganize(ReorganizeOptions::default()).unwrap_err();

    assert!(matches!(err, LayoutError::SchemaMismatch(_)));
    assert!(pipeline.stage() < PipelineStage::Snapshotted);
    assert!(!fixture.layout_dir.join("launcher_layout.xml.bak").exists());
}

#[test]
fn second_run_keeps_the_first_snapshot() {
    let fixture = BackupFixture::new(Tables::Primary);
    let config = fixture.config();

    run(&config, false).unwrap();
    let snapshot_path = fixture.layout_dir.join(format!("{}.bak", common::STORE_RELATIVE));
    let first_snapshot = fs::read(&snapshot_path).unwrap();
    let report = run(&config, false).unwrap();

    assert!(report.snapshot.as_ref().unwrap().created.is_empty());
    assert_eq!(report.snapshot.as_ref().unwrap().existing.len(), 4);
    assert_eq!(fs::read(&snapshot_path).unwrap(), first_snapshot);
    assert_eq!(first_snapshot, fixture.original_store);
    assert!(report.is_consistent());
}

#[test]
fn names_are_harvested_from_the_backup_store() {
    let fixture = BackupFixture::new(Tables::MirrorOnly);
    let names = harvest_app_names(&fixture.config()).unwrap();

    assert_eq!(names.get("com.example.mail").map(String::as_str), Some("Mail"));
    assert_eq!(names.get("com.games.chess").map(String::as_str), Some("Chess"));
    assert_eq!(names.len(), 5);
}
