use deskfold_core::service::allocator::{FIRST_ALLOCATED_ID, GRID_COLUMNS, GRID_ROWS};
use deskfold_core::service::planner::{deduplicate, plan_layout};
use deskfold_core::{CategoryMapping, Container, DesktopItem, ItemKind, RunConfig};
use std::collections::HashSet;

const MODIFIED: i64 = 1_710_000_000_000;

fn app(id: i64, package: &str, container: Container, screen: i64, cell: (i64, i64)) -> DesktopItem {
    let mut item = DesktopItem::new(id, ItemKind::App, container);
    item.intent = Some(format!("#Intent;component={package}/.Main;end"));
    item.title = Some(package.rsplit('.').next().unwrap_or(package).to_string());
    item.screen = screen;
    item.cell_x = cell.0;
    item.cell_y = cell.1;
    item
}

fn mapping(json: &str) -> CategoryMapping {
    CategoryMapping::from_json_text(json).unwrap()
}

#[test]
fn unmapped_screen_zero_app_stays_and_mapped_app_gets_folder() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder(dir.path()).build().unwrap();
    let items = vec![
        app(10, "com.example.a", Container::Root, 0, (1, 1)),
        app(11, "com.example.b", Container::Root, 2, (3, 4)),
    ];
    let mapping = mapping(r#"{"category_order": ["Tools"], "app_categories": {"com.example.b": "Tools"}}"#);

    let plan = plan_layout(items, &mapping, &config, MODIFIED);

    assert_eq!(plan.retained.len(), 1);
    let kept = &plan.retained[0];
    assert_eq!(kept.package_name(), Some("com.example.a"));
    assert_eq!((kept.screen, kept.cell_x, kept.cell_y), (0, 1, 1));
    assert_eq!(kept.container, Container::Root);

    assert_eq!(plan.folders.len(), 1);
    let folder = &plan.folders[0];
    assert_eq!(folder.label, "Tools");
    assert_eq!((folder.screen, folder.cell_x, folder.cell_y), (1, 0, 0));
    assert_eq!(folder.child_count, 1);

    let folder_row = plan.items.iter().find(|item| item.id == folder.id).unwrap();
    assert_eq!(folder_row.title.as_deref(), Some(" Tools"));
    assert_eq!(folder_row.kind, ItemKind::Folder);

    let child = plan
        .items
        .iter()
        .find(|item| item.container == Container::Folder(folder.id))
        .unwrap();
    assert_eq!(child.package_name(), Some("com.example.b"));
    assert_eq!((child.screen, child.cell_x, child.cell_y, child.rank), (0, 0, 0, 0));
    assert_eq!(plan.screen_count, 2);
}

#[test]
fn duplicate_descriptor_and_profile_keep_first_row() {
    let first = app(21, "com.example.dup", Container::Root, 1, (0, 0));
    let mut second = app(42, "com.example.dup", Container::Folder(7), 0, (1, 0));
    second.title = Some("Renamed".to_string());
    let mut other_profile = app(43, "com.example.dup", Container::Root, 1, (2, 0));
    other_profile.user_id = 10;

    let unique = deduplicate(vec![first, second, other_profile]);

    assert_eq!(unique.len(), 2);
    assert_eq!(unique[0].id, 21);
    assert_eq!(unique[1].id, 43);
}

#[test]
fn thirty_buckets_spill_onto_a_second_folder_screen() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder(dir.path()).build().unwrap();

    let labels = (0..30).map(|index| format!("C{index:02}")).collect::<Vec<_>>();
    let categories = labels
        .iter()
        .enumerate()
        .map(|(index, label)| format!(r#""com.example.app{index:02}": "{label}""#))
        .collect::<Vec<_>>()
        .join(", ");
    let order = labels
        .iter()
        .map(|label| format!(r#""{label}""#))
        .collect::<Vec<_>>()
        .join(", ");
    let mapping = mapping(&format!(
        r#"{{"category_order": [{order}], "app_categories": {{{categories}}}}}"#
    ));
    let items = (0..30)
        .map(|index| {
            app(
                index + 1,
                &format!("com.example.app{index:02}"),
                Container::Root,
                1 + index / 24,
                (index % 4, (index / 4) % 6),
            )
        })
        .collect();

    let plan = plan_layout(items, &mapping, &config, MODIFIED);

    assert_eq!(plan.folders.len(), 30);
    let per_screen = (GRID_COLUMNS * GRID_ROWS) as usize;
    for (index, folder) in plan.folders.iter().enumerate().take(per_screen) {
        assert_eq!(folder.label, labels[index]);
        assert_eq!(folder.screen, 1);
        assert_eq!(folder.cell_x, index as i64 % GRID_COLUMNS);
        assert_eq!(folder.cell_y, index as i64 / GRID_COLUMNS);
    }
    let spilled = &plan.folders[per_screen];
    assert_eq!((spilled.screen, spilled.cell_x, spilled.cell_y), (2, 0, 0));
    assert_eq!(plan.screen_count, 3);
    assert_eq!(plan.screens.len(), 3);
    assert!(plan.screens.iter().all(|screen| screen.modified == MODIFIED));
}

#[test]
fn fixed_rows_keep_ids_and_new_rows_get_fresh_unique_ids() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder(dir.path()).build().unwrap();

    let mut dock = app(101, "com.android.dialer", Container::Dock, 0, (0, 0));
    dock.rank = 3;
    let mut widget = DesktopItem::new(103, ItemKind::Widget, Container::Root);
    widget.screen = 2;
    widget.span_x = 4;
    widget.span_y = 2;
    let card = DesktopItem::new(4, ItemKind::Card, Container::Other(-110));
    let items = vec![
        dock.clone(),
        widget,
        card,
        app(5, "com.example.mail", Container::Root, 3, (0, 0)),
        app(6, "com.example.game", Container::Root, 3, (1, 0)),
    ];
    let mapping = mapping(r#"{"app_categories": {"com.example.mail": "Work"}}"#);

    let plan = plan_layout(items, &mapping, &config, MODIFIED);

    let ids = plan.items.iter().map(|item| item.id).collect::<HashSet<_>>();
    assert_eq!(ids.len(), plan.items.len());
    assert!(ids.contains(&101) && ids.contains(&103) && ids.contains(&4));

    let kept_dock = plan.items.iter().find(|item| item.id == 101).unwrap();
    assert_eq!(kept_dock, &dock);
    let kept_widget = plan.items.iter().find(|item| item.id == 103).unwrap();
    assert_eq!(kept_widget.screen, 0);
    assert_eq!((kept_widget.span_x, kept_widget.span_y), (4, 2));

    let labels = plan.folders.iter().map(|folder| folder.label.as_str()).collect::<Vec<_>>();
    assert_eq!(labels, vec!["Work", "Other"]);
    for item in plan.items.iter().filter(|item| ![101, 103, 4].contains(&item.id)) {
        assert!(item.id >= FIRST_ALLOCATED_ID);
        assert_eq!(item.modified, MODIFIED);
    }
}

#[test]
fn apps_without_a_package_are_counted_and_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = RunConfig::builder(dir.path()).build().unwrap();
    let mut shortcut = DesktopItem::new(9, ItemKind::Other(1), Container::Root);
    shortcut.intent = Some("#Intent;action=android.intent.action.CALL;end".to_string());
    shortcut.screen = 1;

    let plan = plan_layout(vec![shortcut], &CategoryMapping::default(), &config, MODIFIED);

    assert_eq!(plan.skipped_without_package, 1);
    assert!(plan.folders.is_empty());
    assert!(plan.items.is_empty());
    assert_eq!(plan.screen_count, 1);
}
