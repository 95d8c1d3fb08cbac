// src/sink/local.rs
//! Optional local outputs, independent of the remote sink.
//!
//! The CSV mirror appends the same rows the sheet receives; the snapshot
//! file is rewritten whole each cycle with the full batch, failures
//! included. Both are best-effort, a local I/O error never blocks the loop.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::extract::ExtractionResult;

use super::{SinkRow, DATA_HEADER, TIMESTAMP_FORMAT};

pub struct CsvMirror {
    path: PathBuf,
}

impl CsvMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append rows, writing the header first when the file is created.
    pub async fn append(&self, rows: &[SinkRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        // The csv writer is synchronous; hand it owned data off-runtime.
        let path = self.path.clone();
        let rows = rows.to_vec();
        tokio::task::spawn_blocking(move || append_sync(&path, &rows)).await??;
        Ok(())
    }
}

fn append_sync(path: &Path, rows: &[SinkRow]) -> Result<()> {
    ensure_parent(path)?;
    let fresh = !path.exists();
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening csv mirror {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    if fresh {
        writer.write_record(DATA_HEADER)?;
    }
    for row in rows {
        writer.write_record(row.cells())?;
    }
    writer.flush()?;
    Ok(())
}

pub struct SnapshotFile {
    path: PathBuf,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    generated_at: String,
    results: &'a [ExtractionResult],
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn write(&self, batch: &[ExtractionResult]) -> Result<()> {
        let body = serde_json::to_vec_pretty(&Snapshot {
            generated_at: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            results: batch,
        })?;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating {}", dir.display()))?;
            }
        }
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing snapshot {}", self.path.display()))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    Ok(())
}
