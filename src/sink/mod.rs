// src/sink/mod.rs
//! Batched publication of cycle results.
//!
//! One [`SinkWriter::write`] call per cycle: build the rows, append them in
//! a single request, then rebuild the roster tab's dropdown rules from the
//! cycle's validation set. The two phases retry independently under the
//! same bounded backoff, so a batch that appended is never appended again
//! while the validation refresh recovers from quota pressure. A failed
//! write is reported, logged and survived; the scheduler keeps cycling.

pub mod local;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;

use crate::extract::{ExtractionResult, ExtractionStatus};
use crate::roster::RosterSnapshot;
use crate::sheets::{SheetsApi, SheetsError, ValidationTarget};

use local::{CsvMirror, SnapshotFile};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const DATA_HEADER: [&str; 7] = [
    "Timestamp",
    "ItemName",
    "CheapestSale",
    "AverageBuyNow",
    "ReferenceAverage",
    "Tag",
    "SourceLink",
];
pub const ROSTER_HEADER: [&str; 4] = ["Name", "SourceLink", "Tag", "Enabled"];

/// One appended record, in the data tab's fixed column order.
#[derive(Debug, Clone, Serialize)]
pub struct SinkRow {
    pub timestamp: String,
    pub item_name: String,
    pub cheapest_sale: Option<u64>,
    pub average_buy_now: Option<u64>,
    pub reference_average: Option<u64>,
    pub tag: String,
    pub source_link: String,
}

impl SinkRow {
    pub fn from_result(r: &ExtractionResult) -> Self {
        Self {
            timestamp: r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            item_name: r.item.name.clone(),
            cheapest_sale: r.fields.cheapest_sale,
            average_buy_now: r.fields.average_buy_now,
            reference_average: r.fields.reference_average,
            tag: r.item.metadata_tags.join(", "),
            source_link: r.item.source_url.clone(),
        }
    }

    /// The seven cells; missing fields render empty, never `0`.
    pub fn cells(&self) -> Vec<String> {
        fn cell(v: Option<u64>) -> String {
            v.map(|n| n.to_string()).unwrap_or_default()
        }
        vec![
            self.timestamp.clone(),
            self.item_name.clone(),
            cell(self.cheapest_sale),
            cell(self.average_buy_now),
            cell(self.reference_average),
            self.tag.clone(),
            self.source_link.clone(),
        ]
    }
}

/// Distinct, sorted name and tag sets of the current snapshot. Recomputed
/// every cycle; dropping an item from the roster drops its dropdown entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSet {
    pub names: Vec<String>,
    pub tags: Vec<String>,
}

impl ValidationSet {
    /// Draws from all snapshot rows, disabled ones included, so pausing an
    /// item keeps its dropdown entry.
    pub fn from_snapshot(snapshot: &RosterSnapshot) -> Self {
        let mut names = BTreeSet::new();
        let mut tags = BTreeSet::new();
        for item in snapshot.items() {
            if !item.name.is_empty() {
                names.insert(item.name.clone());
            }
            for tag in &item.metadata_tags {
                tags.insert(tag.clone());
            }
        }
        Self {
            names: names.into_iter().collect(),
            tags: tags.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows_appended: usize,
    /// Failed results plus partials when partial writing is off.
    pub rows_skipped: usize,
    pub append_ok: bool,
    pub validation_ok: bool,
}

#[derive(Debug, Clone)]
pub struct SinkCfg {
    pub data_tab: String,
    pub roster_tab: String,
    pub write_partial: bool,
    pub max_retries: u8,
    pub backoff_base_ms: u64,
}

impl Default for SinkCfg {
    fn default() -> Self {
        Self {
            data_tab: "Prices".to_string(),
            roster_tab: "Players".to_string(),
            write_partial: true,
            max_retries: 4,
            backoff_base_ms: 500,
        }
    }
}

pub struct SinkWriter {
    api: Arc<dyn SheetsApi>,
    cfg: SinkCfg,
    csv: Option<CsvMirror>,
    snapshot_file: Option<SnapshotFile>,
}

impl SinkWriter {
    pub fn new(api: Arc<dyn SheetsApi>, cfg: SinkCfg) -> Self {
        Self {
            api,
            cfg,
            csv: None,
            snapshot_file: None,
        }
    }

    /// Mirror appended rows into a local CSV file.
    pub fn with_csv(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.csv = Some(CsvMirror::new(path));
        self
    }

    /// Rewrite a local JSON snapshot of the full batch every cycle.
    pub fn with_snapshot(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.snapshot_file = Some(SnapshotFile::new(path));
        self
    }

    /// Publish one cycle's batch. Never fails; remote trouble folds into
    /// the outcome and the next cycle proceeds regardless.
    pub async fn write(
        &self,
        batch: &[ExtractionResult],
        validation: &ValidationSet,
    ) -> WriteOutcome {
        let rows: Vec<SinkRow> = batch
            .iter()
            .filter(|r| match r.status {
                ExtractionStatus::Success => true,
                ExtractionStatus::Partial => self.cfg.write_partial,
                ExtractionStatus::Failed => false,
            })
            .map(SinkRow::from_result)
            .collect();

        let mut outcome = WriteOutcome {
            rows_appended: 0,
            rows_skipped: batch.len() - rows.len(),
            append_ok: true,
            validation_ok: true,
        };

        if !rows.is_empty() {
            let cells: Vec<Vec<String>> = rows.iter().map(SinkRow::cells).collect();
            let range = format!("{}!A2:G", self.cfg.data_tab);
            match self.retry("append", || self.api.append_rows(&range, &cells)).await {
                Ok(n) => {
                    outcome.rows_appended = n;
                    counter!("sink_rows_appended_total").increment(n as u64);
                }
                Err(e) => {
                    outcome.append_ok = false;
                    counter!("sink_append_failures_total").increment(1);
                    tracing::error!(
                        target: "sink",
                        error = %e,
                        rows = rows.len(),
                        "batch append failed, rows lost for this cycle"
                    );
                }
            }
        }

        // The dropdown rules track the roster, not the batch, so they
        // refresh even when no row was appended.
        if let Err(e) = self.refresh_validation(validation).await {
            outcome.validation_ok = false;
            tracing::warn!(target: "sink", error = %e, "validation refresh failed");
        }

        if let Some(csv) = &self.csv {
            if let Err(e) = csv.append(&rows).await {
                counter!("sink_local_write_failures_total").increment(1);
                tracing::warn!(target: "sink", error = %e, "csv mirror write failed");
            }
        }
        if let Some(snap) = &self.snapshot_file {
            if let Err(e) = snap.write(batch).await {
                counter!("sink_local_write_failures_total").increment(1);
                tracing::warn!(target: "sink", error = %e, "snapshot write failed");
            }
        }

        outcome
    }

    /// Make sure both tabs carry their header row. Best-effort at startup.
    pub async fn ensure_headers(&self) -> Result<(), SheetsError> {
        self.ensure_header_row(&self.cfg.data_tab, &DATA_HEADER).await?;
        self.ensure_header_row(&self.cfg.roster_tab, &ROSTER_HEADER).await
    }

    async fn ensure_header_row(&self, tab: &str, want: &[&str]) -> Result<(), SheetsError> {
        let range = format!("{tab}!A1:{}1", col_letter(want.len() - 1));
        let rows = self.api.read_range(&range).await?;
        let have = rows.into_iter().next().unwrap_or_default();
        let up_to_date =
            have.len() >= want.len() && want.iter().zip(&have).all(|(w, h)| h.trim() == *w);
        if !up_to_date {
            let row: Vec<String> = want.iter().map(|s| s.to_string()).collect();
            self.api.update_range(&range, &[row]).await?;
            tracing::info!(target: "sink", tab = tab, "wrote header row");
        }
        Ok(())
    }

    async fn refresh_validation(&self, validation: &ValidationSet) -> Result<(), SheetsError> {
        let names = ValidationTarget {
            tab: self.cfg.roster_tab.clone(),
            column: 0,
            start_row: 1,
        };
        let tags = ValidationTarget {
            tab: self.cfg.roster_tab.clone(),
            column: 2,
            start_row: 1,
        };
        self.retry("validation.names", || {
            self.api.set_validation(&names, &validation.names)
        })
        .await?;
        self.retry("validation.tags", || {
            self.api.set_validation(&tags, &validation.tags)
        })
        .await?;
        counter!("sink_validation_refreshes_total").increment(1);
        Ok(())
    }

    /// Bounded exponential backoff for one remote operation. Quota and
    /// transport errors retry; hard API errors return immediately.
    async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, SheetsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SheetsError>>,
    {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if matches!(e, SheetsError::Quota) {
                        counter!("sink_quota_hits_total").increment(1);
                    }
                    if !(e.retryable() && attempt < self.cfg.max_retries) {
                        return Err(e);
                    }
                    let delay = Duration::from_millis(self.cfg.backoff_base_ms << (attempt - 1));
                    tracing::warn!(
                        target: "sink",
                        op = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "sheets call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn col_letter(idx: usize) -> char {
    debug_assert!(idx < 26);
    (b'A' + idx as u8) as char
}
