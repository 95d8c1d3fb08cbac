// src/scheduler.rs
//! The recurring sync cycle.
//!
//! One cycle walks an explicit phase machine: fetch a roster snapshot,
//! extract each enabled item sequentially, hand the whole batch to the
//! sink, then sleep out the remainder of the interval. Cancellation is
//! cooperative and only observed between items and at suspension points;
//! an in-flight item always finishes and whatever was extracted is still
//! written before the loop stops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use tokio_util::sync::CancellationToken;

use crate::extract::{ExtractionResult, ExtractionStatus, StrategyChain};
use crate::roster::{Item, RosterSnapshot, RosterSource};
use crate::sink::{SinkWriter, ValidationSet};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerCfg {
    /// Cycle cadence, measured from cycle start to cycle start.
    pub interval: Duration,
    /// Pause between two items within a cycle.
    pub item_delay: Duration,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            item_delay: Duration::from_secs(2),
        }
    }
}

enum Phase {
    FetchRoster,
    Extract(RosterSnapshot),
    Write(RosterSnapshot, Vec<ExtractionResult>),
    Done,
}

/// Per-cycle accounting, logged at the end of every cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleTally {
    pub success: usize,
    pub partial: usize,
    pub failed: usize,
    pub rows_appended: usize,
    pub roster_ok: bool,
    pub write_ok: bool,
    pub cancelled: bool,
}

pub struct SyncScheduler {
    roster: Arc<dyn RosterSource>,
    chain: StrategyChain,
    sink: SinkWriter,
    cfg: SchedulerCfg,
    /// Previous cycle's cheapest-sale by source URL, for delta diagnostics.
    last_prices: HashMap<String, u64>,
}

impl SyncScheduler {
    pub fn new(
        roster: Arc<dyn RosterSource>,
        chain: StrategyChain,
        sink: SinkWriter,
        cfg: SchedulerCfg,
    ) -> Self {
        Self {
            roster,
            chain,
            sink,
            cfg,
            last_prices: HashMap::new(),
        }
    }

    /// Run cycles until the token cancels. Consumes the scheduler.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            target: "scheduler",
            interval_secs = self.cfg.interval.as_secs(),
            item_delay_secs = self.cfg.item_delay.as_secs(),
            roster = %self.roster.describe(),
            "sync scheduler starting"
        );

        loop {
            let started = Instant::now();
            let tally = self.run_cycle(&cancel).await;
            let elapsed = started.elapsed();

            histogram!("cycle_duration_ms").record(elapsed.as_millis() as f64);
            gauge!("cycle_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
            tracing::info!(
                target: "scheduler",
                success = tally.success,
                partial = tally.partial,
                failed = tally.failed,
                appended = tally.rows_appended,
                elapsed_ms = elapsed.as_millis() as u64,
                "cycle complete"
            );

            if cancel.is_cancelled() {
                tracing::info!(target: "scheduler", "scheduler stopped");
                return;
            }
            match remaining_sleep(self.cfg.interval, elapsed) {
                Some(wait) => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => {
                            tracing::info!(target: "scheduler", "scheduler stopped during sleep");
                            return;
                        }
                    }
                }
                None => {
                    counter!("cycle_overruns_total").increment(1);
                    tracing::warn!(
                        target: "scheduler",
                        elapsed_ms = elapsed.as_millis() as u64,
                        "cycle overran the interval, starting next immediately"
                    );
                }
            }
        }
    }

    /// One full pass of the phase machine. Public so tests can drive single
    /// cycles without the timing loop.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleTally {
        crate::metrics::describe_once();
        counter!("cycle_total").increment(1);

        let mut tally = CycleTally::default();
        let mut phase = Phase::FetchRoster;
        loop {
            phase = match phase {
                Phase::FetchRoster => match self.roster.current().await {
                    Ok(snapshot) => {
                        tally.roster_ok = true;
                        gauge!("roster_items").set(snapshot.len() as f64);
                        tracing::info!(
                            target: "scheduler",
                            items = snapshot.len(),
                            enabled = snapshot.enabled_count(),
                            "roster snapshot taken"
                        );
                        Phase::Extract(snapshot)
                    }
                    Err(e) => {
                        counter!("roster_fetch_failures_total").increment(1);
                        tracing::warn!(
                            target: "scheduler",
                            error = %e,
                            "roster fetch failed, skipping cycle"
                        );
                        Phase::Done
                    }
                },
                Phase::Extract(snapshot) => {
                    let batch = self.extract_all(&snapshot, cancel, &mut tally).await;
                    Phase::Write(snapshot, batch)
                }
                Phase::Write(snapshot, batch) => {
                    let validation = ValidationSet::from_snapshot(&snapshot);
                    let outcome = self.sink.write(&batch, &validation).await;
                    tally.rows_appended = outcome.rows_appended;
                    tally.write_ok = outcome.append_ok && outcome.validation_ok;
                    Phase::Done
                }
                Phase::Done => break,
            };
        }
        tally
    }

    /// Extract every enabled item in snapshot order, with the inter-item
    /// delay. Returns early (with what it has) when cancelled.
    async fn extract_all(
        &mut self,
        snapshot: &RosterSnapshot,
        cancel: &CancellationToken,
        tally: &mut CycleTally,
    ) -> Vec<ExtractionResult> {
        let items: Vec<Item> = snapshot.enabled().cloned().collect();
        let mut batch = Vec::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                tally.cancelled = true;
            } else if i > 0 && !self.cfg.item_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.cfg.item_delay) => {}
                    _ = cancel.cancelled() => { tally.cancelled = true; }
                }
            }
            if tally.cancelled {
                tracing::info!(
                    target: "scheduler",
                    extracted = i,
                    total = items.len(),
                    "cancellation requested, flushing what we have"
                );
                break;
            }

            let result = self.chain.extract(item).await;
            self.note_price_move(&result);
            match result.status {
                ExtractionStatus::Success => tally.success += 1,
                ExtractionStatus::Partial => tally.partial += 1,
                ExtractionStatus::Failed => tally.failed += 1,
            }
            match result.status {
                ExtractionStatus::Failed => tracing::warn!(
                    target: "scheduler",
                    item = %item.name,
                    failure = result.failure.as_deref().unwrap_or("unknown"),
                    "item failed"
                ),
                _ => tracing::info!(
                    target: "scheduler",
                    item = %item.name,
                    status = ?result.status,
                    strategy = result.strategy.unwrap_or("-"),
                    cheapest = result.fields.cheapest_sale,
                    avg_bin = result.fields.average_buy_now,
                    ref_avg = result.fields.reference_average,
                    "item extracted"
                ),
            }
            batch.push(result);
        }
        batch
    }

    /// Log the movement of an item's cheapest sale against the previous
    /// cycle. Diagnostics only, nothing downstream reads this.
    fn note_price_move(&mut self, result: &ExtractionResult) {
        let Some(now) = result.fields.cheapest_sale else {
            return;
        };
        match self.last_prices.insert(result.item.source_url.clone(), now) {
            Some(prev) if prev > 0 && prev != now => {
                let pct = format!("{:+.1}%", (now as f64 - prev as f64) / prev as f64 * 100.0);
                tracing::info!(
                    target: "scheduler",
                    item = %result.item.name,
                    prev,
                    now,
                    pct = %pct,
                    "cheapest sale moved"
                );
            }
            _ => {}
        }
    }
}

/// Time left to sleep after a cycle. `None` means the cycle used the whole
/// interval (or more) and the next one starts immediately.
pub fn remaining_sleep(interval: Duration, elapsed: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}
