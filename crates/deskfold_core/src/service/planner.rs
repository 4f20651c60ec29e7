//! Layout planning: structural roles, dedup and category buckets.
//!
//! # Responsibility
//! - Split raw rows into dock, widgets, cards, legacy folders, root apps and
//!   folder children.
//! - Collapse duplicate apps and bucket the survivors by category.
//!
//! # Invariants
//! - Dedup keeps the first occurrence of each `(intent, user_id)` key and
//!   preserves input order.
//! - Unmapped apps that sat on screen 0 at the root keep their original
//!   cell; every other unmapped app lands in the fallback bucket.
//! - Bucket order is the mapping's explicit order, then remaining labels in
//!   lexical order, then the fallback bucket; empty buckets are dropped.

use crate::config::RunConfig;
use crate::model::item::{Container, DesktopItem, ItemKind};
use crate::model::mapping::CategoryMapping;
use crate::model::plan::{CategoryBucket, LayoutPlan};
use crate::service::allocator::{allocate, FixedItems};
use log::{info, warn};
use std::collections::{HashMap, HashSet};

/// Raw rows partitioned by structural role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedItems {
    pub dock: Vec<DesktopItem>,
    pub widgets: Vec<DesktopItem>,
    pub cards: Vec<DesktopItem>,
    /// Folders from the previous layout; discarded after planning.
    pub legacy_folders: Vec<DesktopItem>,
    /// Apps placed directly on a home screen.
    pub root_apps: Vec<DesktopItem>,
    /// Apps inside a folder (`container >= 0`).
    pub folder_apps: Vec<DesktopItem>,
    /// Items under a container sentinel the planner does not handle.
    pub unplaced: Vec<DesktopItem>,
}

/// Partitions rows by structural role.
///
/// Kind decides first (widget, card, folder); everything else is placed by
/// its container.
pub fn classify(items: Vec<DesktopItem>) -> ClassifiedItems {
    let mut classified = ClassifiedItems::default();
    for item in items {
        match (item.kind, item.container) {
            (ItemKind::Widget, _) => classified.widgets.push(item),
            (ItemKind::Card, _) => classified.cards.push(item),
            (ItemKind::Folder, _) => classified.legacy_folders.push(item),
            (_, Container::Dock) => classified.dock.push(item),
            (_, Container::Root) => classified.root_apps.push(item),
            (_, Container::Folder(_)) => classified.folder_apps.push(item),
            (_, Container::Other(_)) => classified.unplaced.push(item),
        }
    }

    info!(
        "event=classify module=planner status=ok dock={} widgets={} cards={} legacy_folders={} root_apps={} folder_apps={} unplaced={}",
        classified.dock.len(),
        classified.widgets.len(),
        classified.cards.len(),
        classified.legacy_folders.len(),
        classified.root_apps.len(),
        classified.folder_apps.len(),
        classified.unplaced.len()
    );
    classified
}

/// Drops repeated `(intent, user_id)` keys, keeping the first occurrence.
///
/// Items without a launch descriptor cannot be keyed and are dropped.
pub fn deduplicate(apps: impl IntoIterator<Item = DesktopItem>) -> Vec<DesktopItem> {
    let mut seen = HashSet::<(String, i64)>::new();
    let mut unique = Vec::new();
    for app in apps {
        let Some((intent, user_id)) = app.dedup_key() else {
            continue;
        };
        if seen.insert((intent.to_string(), user_id)) {
            unique.push(app);
        }
    }
    unique
}

/// Apps split into retained screen-0 icons and ordered category buckets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketPlan {
    /// Original rows of unmapped screen-0 root apps.
    pub retained: Vec<DesktopItem>,
    pub buckets: Vec<CategoryBucket>,
    /// Apps whose descriptor names no package; left out of the layout.
    pub skipped_without_package: usize,
}

/// Buckets deduplicated `apps` by category.
///
/// `root_apps` are the rows originally placed at the root; an unmapped app
/// is retained when a row with its dedup key sat on screen 0 there.
pub fn plan(
    apps: Vec<DesktopItem>,
    root_apps: &[DesktopItem],
    mapping: &CategoryMapping,
    fallback_label: &str,
) -> BucketPlan {
    let mut screen_zero = HashMap::<(String, i64), &DesktopItem>::new();
    for app in root_apps {
        if app.screen != 0 || !app.is_root() {
            continue;
        }
        if let Some((intent, user_id)) = app.dedup_key() {
            screen_zero.entry((intent.to_string(), user_id)).or_insert(app);
        }
    }

    let mut categorized = HashMap::<String, Vec<DesktopItem>>::new();
    let mut unmapped = Vec::new();
    let mut result = BucketPlan::default();

    for app in apps {
        let Some(package) = app.package_name() else {
            result.skipped_without_package += 1;
            continue;
        };

        if let Some(label) = mapping.category_for(package) {
            categorized.entry(label.to_string()).or_default().push(app);
            continue;
        }

        let original = app
            .dedup_key()
            .and_then(|(intent, user_id)| screen_zero.get(&(intent.to_string(), user_id)));
        match original {
            Some(original) => result.retained.push((*original).clone()),
            None => {
                warn!(
                    "event=plan_unmapped module=planner status=warn package={} title={}",
                    package,
                    app.title.as_deref().unwrap_or("?")
                );
                unmapped.push(app);
            }
        }
    }

    let order = mapping.order_labels(categorized.keys().map(String::as_str));
    result.buckets = order
        .into_iter()
        .filter_map(|label| {
            let apps = categorized.remove(&label)?;
            (!apps.is_empty()).then_some(CategoryBucket { label, apps })
        })
        .collect();

    if !unmapped.is_empty() {
        match result
            .buckets
            .iter_mut()
            .find(|bucket| bucket.label == fallback_label)
        {
            Some(bucket) => bucket.apps.extend(unmapped),
            None => result.buckets.push(CategoryBucket {
                label: fallback_label.to_string(),
                apps: unmapped,
            }),
        }
    }

    for bucket in &result.buckets {
        info!(
            "event=plan_bucket module=planner status=ok label={} apps={}",
            bucket.label,
            bucket.apps.len()
        );
    }
    result
}

/// Runs classify, dedup, bucketing and allocation over freshly read rows.
pub fn plan_layout(
    items: Vec<DesktopItem>,
    mapping: &CategoryMapping,
    config: &RunConfig,
    modified: i64,
) -> LayoutPlan {
    let classified = classify(items);
    let unique = deduplicate(
        classified
            .root_apps
            .iter()
            .cloned()
            .chain(classified.folder_apps.iter().cloned()),
    );
    info!(
        "event=dedup module=planner status=ok unique_apps={}",
        unique.len()
    );

    let buckets = plan(
        unique,
        &classified.root_apps,
        mapping,
        config.fallback_category(),
    );
    let fixed = FixedItems {
        dock: classified.dock,
        widgets: classified.widgets,
        cards: classified.cards,
    };
    allocate(fixed, buckets, config, modified)
}

#[cfg(test)]
mod tests {
    use super::{classify, deduplicate, plan};
    use crate::model::item::{Container, DesktopItem, ItemKind};
    use crate::model::mapping::CategoryMapping;

    fn app(id: i64, package: &str, container: Container, screen: i64) -> DesktopItem {
        let mut item = DesktopItem::new(id, ItemKind::App, container);
        item.intent = Some(format!("#Intent;component={package}/.Main;end"));
        item.screen = screen;
        item
    }

    #[test]
    fn classify_prefers_kind_over_container() {
        let widget_in_dock = DesktopItem::new(1, ItemKind::Widget, Container::Dock);
        let folder = DesktopItem::new(2, ItemKind::Folder, Container::Root);
        let shortcut = DesktopItem::new(3, ItemKind::Other(1), Container::Folder(2));
        let hotseat = DesktopItem::new(4, ItemKind::App, Container::Other(-102));

        let classified = classify(vec![widget_in_dock, folder, shortcut, hotseat]);
        assert_eq!(classified.widgets.len(), 1);
        assert_eq!(classified.legacy_folders.len(), 1);
        assert_eq!(classified.folder_apps.len(), 1);
        assert_eq!(classified.unplaced.len(), 1);
        assert!(classified.dock.is_empty());
    }

    #[test]
    fn deduplicate_keeps_first_and_skips_keyless() {
        let first = app(10, "com.a", Container::Root, 1);
        let second = app(11, "com.a", Container::Folder(3), 0);
        let mut other_profile = app(12, "com.a", Container::Root, 1);
        other_profile.user_id = 10;
        let keyless = DesktopItem::new(13, ItemKind::App, Container::Root);

        let unique = deduplicate(vec![first, second, other_profile, keyless]);
        let ids = unique.iter().map(|item| item.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![10, 12]);
    }

    #[test]
    fn unmapped_screen_zero_root_app_is_retained() {
        let mut home = app(10, "com.home", Container::Root, 0);
        home.cell_x = 1;
        home.cell_y = 1;
        let stray = app(11, "com.stray", Container::Root, 2);
        let mapping = CategoryMapping::default();

        let roots = vec![home.clone(), stray.clone()];
        let planned = plan(vec![home, stray], &roots, &mapping, "Other");
        assert_eq!(planned.retained.len(), 1);
        assert_eq!(planned.retained[0].id, 10);
        assert_eq!(planned.buckets.len(), 1);
        assert_eq!(planned.buckets[0].label, "Other");
        assert_eq!(planned.buckets[0].apps[0].id, 11);
    }

    #[test]
    fn fallback_merges_into_existing_bucket_with_same_label() {
        let mapped = app(10, "com.mapped", Container::Root, 1);
        let stray = app(11, "com.stray", Container::Root, 1);
        let mut mapping = CategoryMapping::default();
        mapping
            .app_categories
            .insert("com.mapped".into(), "Other".into());

        let planned = plan(vec![mapped, stray], &[], &mapping, "Other");
        assert_eq!(planned.buckets.len(), 1);
        assert_eq!(planned.buckets[0].apps.len(), 2);
    }

    #[test]
    fn apps_without_package_are_counted_and_skipped() {
        let mut broken = DesktopItem::new(10, ItemKind::App, Container::Root);
        broken.intent = Some("#Intent;action=VIEW;end".into());
        let planned = plan(vec![broken], &[], &CategoryMapping::default(), "Other");
        assert_eq!(planned.skipped_without_package, 1);
        assert!(planned.buckets.is_empty());
    }
}
