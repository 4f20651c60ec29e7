//! Category mapping document produced by the classification step.
//!
//! # Responsibility
//! - Load the package -> category table, explicit category order,
//!   unclassified holding list and display names.
//! - Provide the bucket ordering rule shared by planning and statistics.
//!
//! # Invariants
//! - The mapping is read-only input; core never writes it back.
//! - Display names live in `app_names`. Trailing `// name` comments from
//!   older hand-edited files are stripped before parsing and only fill
//!   names the field does not already provide.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type MappingResult<T> = Result<T, MappingError>;

static COMMENTED_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*"([^"]+)"\s*:\s*"[^"]+",?\s*//\s*(.+?)\s*$"#)
        .expect("commented entry pattern is valid")
});

#[derive(Debug)]
pub enum MappingError {
    NotFound(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => {
                write!(f, "category mapping file not found: {}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "failed to read category mapping {}: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "invalid category mapping {}: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "invalid category mapping: {source}"),
        }
    }
}

impl Error for MappingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound(_) => None,
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

/// Package classification handed over by the external classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMapping {
    /// Explicit display order of category labels.
    #[serde(default)]
    pub category_order: Vec<String>,
    /// Package name -> category label.
    #[serde(default)]
    pub app_categories: BTreeMap<String, String>,
    /// Packages the classifier could not place yet.
    #[serde(default)]
    pub unclassified: Vec<String>,
    /// Package name -> human-readable display name.
    #[serde(default)]
    pub app_names: BTreeMap<String, String>,
}

impl CategoryMapping {
    /// Loads a mapping document from disk.
    pub fn load(path: &Path) -> MappingResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(MappingError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(MappingError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::from_json_text(&raw).map_err(|err| match err {
            MappingError::Parse { source, .. } => MappingError::Parse {
                path: Some(path.to_path_buf()),
                source,
            },
            other => other,
        })
    }

    /// Parses mapping text, tolerating trailing `//` display-name comments.
    pub fn from_json_text(raw: &str) -> MappingResult<Self> {
        let harvested = harvest_comment_names(raw);
        let mut mapping: Self = serde_json::from_str(&strip_trailing_comments(raw))
            .map_err(|source| MappingError::Parse { path: None, source })?;
        for (package, name) in harvested {
            mapping.app_names.entry(package).or_insert(name);
        }
        Ok(mapping)
    }

    /// Returns the category label assigned to `package`, if any.
    ///
    /// Blank labels count as unmapped.
    pub fn category_for(&self, package: &str) -> Option<&str> {
        self.app_categories
            .get(package)
            .map(|label| label.trim())
            .filter(|label| !label.is_empty())
    }

    pub fn display_name(&self, package: &str) -> Option<&str> {
        self.app_names.get(package).map(String::as_str)
    }

    /// Orders `present` labels: explicit order first, the rest lexically.
    pub fn order_labels<'a>(&self, present: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let present = present.into_iter().collect::<BTreeSet<_>>();
        let mut ordered = Vec::with_capacity(present.len());
        for label in &self.category_order {
            if present.contains(label.as_str()) && !ordered.contains(label) {
                ordered.push(label.clone());
            }
        }
        for label in present {
            if !self.category_order.iter().any(|known| known == label) {
                ordered.push(label.to_string());
            }
        }
        ordered
    }

    /// Per-category package counts in bucket order.
    pub fn category_counts(&self) -> Vec<(String, usize)> {
        let mut counts = BTreeMap::<&str, usize>::new();
        for package in self.app_categories.keys() {
            if let Some(label) = self.category_for(package) {
                *counts.entry(label).or_default() += 1;
            }
        }
        self.order_labels(counts.keys().copied())
            .into_iter()
            .map(|label| {
                let count = counts.get(label.as_str()).copied().unwrap_or_default();
                (label, count)
            })
            .collect()
    }
}

fn strip_trailing_comments(raw: &str) -> String {
    raw.lines()
        .map(|line| match line.rfind('"') {
            Some(last_quote) => match line[last_quote + 1..].find("//") {
                Some(offset) => line[..last_quote + 1 + offset].trim_end(),
                None => line,
            },
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn harvest_comment_names(raw: &str) -> BTreeMap<String, String> {
    let mut names = BTreeMap::new();
    let mut in_categories = false;
    for line in raw.lines() {
        if !in_categories {
            in_categories = line.contains("\"app_categories\"") && line.contains('{');
            continue;
        }
        if line.trim_start().starts_with('}') {
            break;
        }
        if let Some(captures) = COMMENTED_ENTRY.captures(line) {
            names
                .entry(captures[1].to_string())
                .or_insert_with(|| captures[2].to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::{CategoryMapping, MappingError};

    const COMMENTED: &str = r#"{
  "category_order": ["Social", "Tools"],
  "app_categories": {
    "com.chat.app": "Social",  // Chat
    "com.util.calc": "Tools",
    "com.url.app": "Tools"  // Links // http://x
  },
  "unclassified": ["com.mystery"]
}"#;

    #[test]
    fn parses_commented_mapping_and_harvests_names() {
        let mapping = CategoryMapping::from_json_text(COMMENTED).unwrap();
        assert_eq!(mapping.category_for("com.chat.app"), Some("Social"));
        assert_eq!(mapping.display_name("com.chat.app"), Some("Chat"));
        assert_eq!(mapping.display_name("com.util.calc"), None);
        assert_eq!(mapping.display_name("com.url.app"), Some("Links // http://x"));
        assert_eq!(mapping.unclassified, vec!["com.mystery"]);
    }

    #[test]
    fn explicit_app_names_win_over_comments() {
        let raw = r#"{
  "app_categories": {
    "com.chat.app": "Social"  // Old
  },
  "app_names": { "com.chat.app": "New" }
}"#;
        let mapping = CategoryMapping::from_json_text(raw).unwrap();
        assert_eq!(mapping.display_name("com.chat.app"), Some("New"));
    }

    #[test]
    fn order_labels_puts_explicit_first_then_lexical() {
        let mapping = CategoryMapping {
            category_order: vec!["Tools".into(), "Games".into()],
            ..CategoryMapping::default()
        };
        let ordered = mapping.order_labels(["Zeta", "Tools", "Alpha"]);
        assert_eq!(ordered, vec!["Tools", "Alpha", "Zeta"]);
    }

    #[test]
    fn blank_category_counts_as_unmapped() {
        let mapping =
            CategoryMapping::from_json_text(r#"{"app_categories": {"a": "  "}}"#).unwrap();
        assert_eq!(mapping.category_for("a"), None);
        assert!(mapping.category_counts().is_empty());
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = CategoryMapping::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, MappingError::NotFound(_)));
    }
}
