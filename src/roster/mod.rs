// src/roster/mod.rs
//! Item roster: what to track and where it comes from.
//!
//! A [`RosterSource`] yields an immutable [`RosterSnapshot`] at the start of
//! every cycle; the remote roster is never locked or mutated by reads, and
//! edits land in the next snapshot. Two sources exist: a spreadsheet tab
//! (the normal mode) and a local JSON file.

pub mod file;
pub mod sheet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::sheets::SheetsError;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("roster sheet read: {0}")]
    Sheet(#[from] SheetsError),
    #[error("roster file {path}: {message}")]
    File { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    /// Canonical market-page URL; the item's identity within a snapshot.
    pub source_url: String,
    /// Free-form classification strings. Logged and fed to the dropdown
    /// lists, never used for extraction.
    #[serde(default)]
    pub metadata_tags: Vec<String>,
    pub enabled: bool,
}

/// The roster as read at one instant. Keyed by `source_url` with the first
/// occurrence's position kept and the last occurrence's data winning.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    items: IndexMap<String, Item>,
    pub taken_at: DateTime<Utc>,
}

impl RosterSnapshot {
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut map: IndexMap<String, Item> = IndexMap::with_capacity(items.len());
        for item in items {
            if let Some(prev) = map.get(&item.source_url) {
                tracing::warn!(
                    target: "roster",
                    url = %item.source_url,
                    kept = %item.name,
                    replaced = %prev.name,
                    "duplicate source link in roster, later row wins"
                );
            }
            map.insert(item.source_url.clone(), item);
        }
        Self {
            items: map,
            taken_at: Utc::now(),
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Item> {
        self.items.values().filter(|i| i.enabled)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled().count()
    }
}

#[async_trait::async_trait]
pub trait RosterSource: Send + Sync {
    /// Capture a fresh snapshot. Reading never mutates the upstream roster.
    async fn current(&self) -> Result<RosterSnapshot, RosterError>;
    fn describe(&self) -> String;
}

/// Literal sets the roster's Enabled cells may carry. Anything else is
/// treated as disabled so a typo pauses an item instead of tracking it.
pub fn parse_enabled(raw: &str) -> bool {
    let norm = raw.trim().to_ascii_uppercase();
    match norm.as_str() {
        "TRUE" | "YES" | "1" | "ENABLED" => true,
        "FALSE" | "NO" | "0" | "DISABLED" | "" => false,
        other => {
            tracing::warn!(
                target: "roster",
                literal = other,
                "unrecognized enabled literal, treating as disabled"
            );
            false
        }
    }
}

pub(crate) fn usable_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| trimmed.to_string())
}

pub(crate) fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turn one `Name | SourceLink | Tag | Enabled` row into an [`Item`].
/// Rows without a usable http(s) link are dropped with a diagnostic; blank
/// filler rows are dropped silently.
pub fn item_from_row(row: &[String]) -> Option<Item> {
    let name = row.first().map(|s| s.trim()).unwrap_or_default();
    let url_raw = row.get(1).map(String::as_str).unwrap_or_default();

    let Some(source_url) = usable_url(url_raw) else {
        if !(name.is_empty() && url_raw.trim().is_empty()) {
            tracing::warn!(
                target: "roster",
                name = name,
                link = url_raw.trim(),
                "dropping roster row without usable source link"
            );
        }
        return None;
    };

    Some(Item {
        name: name.to_string(),
        source_url,
        metadata_tags: split_tags(row.get(2).map(String::as_str).unwrap_or_default()),
        enabled: parse_enabled(row.get(3).map(String::as_str).unwrap_or_default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn enabled_literals_are_case_insensitive() {
        for raw in ["TRUE", "true", " Yes ", "1", "enabled"] {
            assert!(parse_enabled(raw), "raw = {raw:?}");
        }
        for raw in ["FALSE", "no", "0", "Disabled", "", "  ", "maybe", "2"] {
            assert!(!parse_enabled(raw), "raw = {raw:?}");
        }
    }

    #[test]
    fn rows_without_a_link_are_dropped() {
        assert!(item_from_row(&row(&["Ronaldo", "", "Icon", "TRUE"])).is_none());
        assert!(item_from_row(&row(&["Ronaldo", "not a url", "", "TRUE"])).is_none());
        assert!(item_from_row(&row(&["Ronaldo", "ftp://x.example/p", "", "TRUE"])).is_none());
        assert!(item_from_row(&row(&[])).is_none());
    }

    #[test]
    fn short_rows_default_missing_cells() {
        let item = item_from_row(&row(&["Ronaldo", "https://market.example/p/1"])).unwrap();
        assert!(item.metadata_tags.is_empty());
        assert!(!item.enabled);
    }

    #[test]
    fn tags_split_on_commas_and_trim() {
        let item = item_from_row(&row(&[
            "Ronaldo",
            "https://market.example/p/1",
            " Icon, TOTY ,,",
            "yes",
        ]))
        .unwrap();
        assert_eq!(item.metadata_tags, vec!["Icon", "TOTY"]);
        assert!(item.enabled);
    }

    #[test]
    fn duplicate_links_keep_first_position_last_data() {
        let a = item_from_row(&row(&["Old name", "https://m.example/p/1", "", "TRUE"])).unwrap();
        let b = item_from_row(&row(&["Midfielder", "https://m.example/p/2", "", "TRUE"])).unwrap();
        let c = item_from_row(&row(&["New name", "https://m.example/p/1", "", "FALSE"])).unwrap();
        let snap = RosterSnapshot::from_items(vec![a, b, c]);

        assert_eq!(snap.len(), 2);
        let items: Vec<&Item> = snap.items().collect();
        assert_eq!(items[0].name, "New name");
        assert!(!items[0].enabled);
        assert_eq!(items[1].name, "Midfielder");
    }

    #[test]
    fn enabled_iteration_skips_disabled_rows() {
        let snap = RosterSnapshot::from_items(vec![
            item_from_row(&row(&["A", "https://m.example/a", "", "TRUE"])).unwrap(),
            item_from_row(&row(&["B", "https://m.example/b", "", "no"])).unwrap(),
        ]);
        assert_eq!(snap.enabled_count(), 1);
        assert_eq!(snap.enabled().next().unwrap().name, "A");
    }
}
