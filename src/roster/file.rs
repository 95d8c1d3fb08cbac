// src/roster/file.rs
//! Roster source backed by a local JSON document.
//!
//! The document holds an `items` list (accepted under its legacy key
//! `players` too) plus an optional `settings` block. The item list is
//! re-read on every snapshot so edits take effect next cycle; the settings
//! block is only consulted once, at startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{parse_enabled, split_tags, usable_url, Item, RosterError, RosterSnapshot, RosterSource};

#[derive(Debug, Deserialize)]
pub struct RosterDoc {
    #[serde(default, alias = "players")]
    pub items: Vec<FileItem>,
    #[serde(default)]
    pub settings: Option<FileSettings>,
}

#[derive(Debug, Deserialize)]
pub struct FileItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "enabled_default")]
    pub enabled: EnabledFlag,
    #[serde(default)]
    pub notes: String,
}

/// File entries may carry a JSON bool or one of the roster's enabled
/// literals as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EnabledFlag {
    Bool(bool),
    Text(String),
}

impl EnabledFlag {
    fn as_bool(&self) -> bool {
        match self {
            EnabledFlag::Bool(b) => *b,
            EnabledFlag::Text(s) => parse_enabled(s),
        }
    }
}

fn enabled_default() -> EnabledFlag {
    EnabledFlag::Bool(true)
}

/// Startup-only overrides a roster file may carry alongside its items.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSettings {
    pub interval_secs: Option<u64>,
    pub item_delay_secs: Option<u64>,
    pub headless: Option<bool>,
    pub csv_path: Option<String>,
    pub snapshot_path: Option<String>,
}

pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load_doc(&self) -> Result<RosterDoc, RosterError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RosterError::File {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        parse_doc(&content).map_err(|message| RosterError::File {
            path: self.path.display().to_string(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl RosterSource for FileRoster {
    async fn current(&self) -> Result<RosterSnapshot, RosterError> {
        let doc = self.load_doc().await?;
        let items = doc.items.into_iter().filter_map(item_from_entry).collect();
        Ok(RosterSnapshot::from_items(items))
    }

    fn describe(&self) -> String {
        format!("roster file {}", self.path.display())
    }
}

/// Read only the `settings` block, synchronously. Used once at startup,
/// before the scheduler exists.
pub fn read_settings_block(path: &Path) -> Result<Option<FileSettings>, RosterError> {
    let content = std::fs::read_to_string(path).map_err(|e| RosterError::File {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let doc = parse_doc(&content).map_err(|message| RosterError::File {
        path: path.display().to_string(),
        message,
    })?;
    Ok(doc.settings)
}

fn parse_doc(content: &str) -> Result<RosterDoc, String> {
    serde_json::from_str(content).map_err(|e| format!("parse: {e}"))
}

fn item_from_entry(entry: FileItem) -> Option<Item> {
    let Some(source_url) = usable_url(&entry.url) else {
        tracing::warn!(
            target: "roster",
            name = %entry.name,
            link = %entry.url.trim(),
            "dropping roster entry without usable source link"
        );
        return None;
    };
    Some(Item {
        name: entry.name.trim().to_string(),
        source_url,
        metadata_tags: split_tags(&entry.notes),
        enabled: entry.enabled.as_bool(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_parses_items_with_defaults() {
        let doc = parse_doc(
            r#"{
                "items": [
                    {"name": "Ronaldo", "url": "https://market.example/p/1", "notes": "Icon"},
                    {"name": "Paused", "url": "https://market.example/p/2", "enabled": false}
                ]
            }"#,
        )
        .unwrap();
        let items: Vec<Item> = doc.items.into_iter().filter_map(item_from_entry).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].enabled);
        assert_eq!(items[0].metadata_tags, vec!["Icon"]);
        assert!(!items[1].enabled);
    }

    #[test]
    fn legacy_players_key_and_string_flags_still_work() {
        let doc = parse_doc(
            r#"{
                "players": [
                    {"name": "A", "url": "https://market.example/p/1", "enabled": "YES"},
                    {"name": "B", "url": "https://market.example/p/2", "enabled": "nope"}
                ],
                "settings": {"interval_secs": 45, "headless": false}
            }"#,
        )
        .unwrap();
        let settings = doc.settings.unwrap();
        assert_eq!(settings.interval_secs, Some(45));
        assert_eq!(settings.headless, Some(false));

        let items: Vec<Item> = doc.items.into_iter().filter_map(item_from_entry).collect();
        assert!(items[0].enabled);
        assert!(!items[1].enabled, "unknown literal pauses the item");
    }

    #[test]
    fn entries_without_usable_links_are_dropped() {
        let doc = parse_doc(
            r#"{"items": [{"name": "X", "url": "definitely not a url"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.items.len(), 1);
        assert!(doc.items.into_iter().filter_map(item_from_entry).next().is_none());
    }
}
