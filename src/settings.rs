// src/settings.rs
//! Runtime configuration.
//!
//! A TOML file with built-in defaults for every knob; the path comes from
//! the first CLI argument, then `$TRACKER_CONFIG`, then
//! `config/tracker.toml`. Secrets stay in the environment
//! (`SPREADSHEET_ID`, `SHEETS_API_TOKEN`). A malformed settings source is
//! the one fatal error class in the system, everything downstream degrades
//! per cycle instead.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use crate::extract::rendered::RenderCfg;
use crate::roster::file::FileSettings;
use crate::sink::SinkCfg;

const ENV_PATH: &str = "TRACKER_CONFIG";
const DEFAULT_PATH: &str = "config/tracker.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cycle cadence in seconds, measured cycle start to cycle start.
    pub interval_secs: u64,
    /// Pause between two items within a cycle.
    pub item_delay_secs: u64,
    /// `host:port` for the Prometheus exporter; unset disables it.
    pub metrics_listen: Option<String>,
    pub roster: RosterCfg,
    pub sheets: SheetsCfg,
    pub extract: ExtractCfg,
    pub outputs: OutputsCfg,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            item_delay_secs: 2,
            metrics_listen: None,
            roster: RosterCfg::default(),
            sheets: SheetsCfg::default(),
            extract: ExtractCfg::default(),
            outputs: OutputsCfg::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterMode {
    Sheet,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RosterCfg {
    pub mode: RosterMode,
    /// Roster tab title in sheet mode.
    pub tab: String,
    /// Roster document path in file mode.
    pub file: String,
}

impl Default for RosterCfg {
    fn default() -> Self {
        Self {
            mode: RosterMode::Sheet,
            tab: "Players".to_string(),
            file: "config/roster.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetsCfg {
    /// Overridable via `SPREADSHEET_ID`.
    pub spreadsheet_id: String,
    pub data_tab: String,
    pub write_partial: bool,
    pub max_retries: u8,
    pub backoff_base_ms: u64,
}

impl Default for SheetsCfg {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            data_tab: "Prices".to_string(),
            write_partial: true,
            max_retries: 4,
            backoff_base_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractCfg {
    pub headless: bool,
    pub http_timeout_secs: u64,
    pub nav_timeout_secs: u64,
    pub settle_secs: u64,
    pub poll_ms: u64,
}

impl Default for ExtractCfg {
    fn default() -> Self {
        Self {
            headless: true,
            http_timeout_secs: 20,
            nav_timeout_secs: 30,
            settle_secs: 12,
            poll_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputsCfg {
    pub csv_path: Option<String>,
    pub snapshot_path: Option<String>,
}

impl Settings {
    /// Resolution order: the explicit path when given (the binary passes
    /// its first CLI argument here), then `$TRACKER_CONFIG` (which must
    /// exist when set), then `config/tracker.toml`, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut settings = match explicit {
            Some(path) => Self::parse_file(path)?,
            None => match resolve_path()? {
                Some(path) => Self::parse_file(&path)?,
                None => Self::default(),
            },
        };
        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing settings from {}", path.display()))
    }

    /// Environment wins over the file for the values operators rotate.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SPREADSHEET_ID") {
            if !v.trim().is_empty() {
                self.sheets.spreadsheet_id = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("TRACKER_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.interval_secs = n;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.interval_secs >= 1, "interval_secs must be at least 1");
        ensure!(
            self.sheets.max_retries >= 1,
            "sheets.max_retries must be at least 1"
        );
        Ok(())
    }

    /// Fold in the startup-only overrides a local roster file may carry.
    pub fn merge_file_settings(&mut self, overrides: &FileSettings) {
        if let Some(v) = overrides.interval_secs {
            self.interval_secs = v;
        }
        if let Some(v) = overrides.item_delay_secs {
            self.item_delay_secs = v;
        }
        if let Some(v) = overrides.headless {
            self.extract.headless = v;
        }
        if let Some(v) = &overrides.csv_path {
            self.outputs.csv_path = Some(v.clone());
        }
        if let Some(v) = &overrides.snapshot_path {
            self.outputs.snapshot_path = Some(v.clone());
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_secs(self.item_delay_secs)
    }

    pub fn sink_cfg(&self) -> SinkCfg {
        SinkCfg {
            data_tab: self.sheets.data_tab.clone(),
            roster_tab: self.roster.tab.clone(),
            write_partial: self.sheets.write_partial,
            max_retries: self.sheets.max_retries,
            backoff_base_ms: self.sheets.backoff_base_ms,
        }
    }

    pub fn render_cfg(&self) -> RenderCfg {
        RenderCfg {
            headless: self.extract.headless,
            nav_timeout: Duration::from_secs(self.extract.nav_timeout_secs),
            settle: Duration::from_secs(self.extract.settle_secs),
            poll_interval: Duration::from_millis(self.extract.poll_ms),
            ..RenderCfg::default()
        }
    }
}

fn resolve_path() -> Result<Option<PathBuf>> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(&p);
        ensure!(pb.exists(), "{ENV_PATH} points to non-existent path {p:?}");
        return Ok(Some(pb));
    }
    let default = PathBuf::from(DEFAULT_PATH);
    if default.exists() {
        return Ok(Some(default));
    }
    Ok(None)
}
