// src/extract/mod.rs
//! Extraction engine: an ordered chain of page-fetch strategies feeding a
//! shared DOM scan.
//!
//! Strategies only differ in how they obtain the page body (plain GET vs a
//! rendered browsing context). The chain stops at the first strategy that
//! produces all three fields; an incomplete set is kept as best-so-far and
//! only ever replaced wholesale by a strictly larger one. Fields from two
//! strategies are never merged, a half-rendered page must not be stitched
//! together with a stale static one.

pub mod page;
pub mod price;
pub mod rendered;
pub mod static_http;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;

use crate::roster::Item;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("render: {0}")]
    Render(String),
    #[error("bot challenge at {url}")]
    BotChallenge { url: String },
}

impl ExtractError {
    /// Stable kind label for metrics and log filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Transport(_) => "transport",
            ExtractError::Render(_) => "render",
            ExtractError::BotChallenge { .. } => "bot_challenge",
        }
    }
}

/// The three market-price fields a listing page carries. All optional; a
/// scan fills in whatever it could read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriceFields {
    pub cheapest_sale: Option<u64>,
    pub average_buy_now: Option<u64>,
    pub reference_average: Option<u64>,
}

impl PriceFields {
    pub fn count(&self) -> usize {
        [
            self.cheapest_sale,
            self.average_buy_now,
            self.reference_average,
        ]
        .iter()
        .filter(|f| f.is_some())
        .count()
    }

    pub fn is_complete(&self) -> bool {
        self.count() == 3
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Success,
    Partial,
    Failed,
}

/// One item's outcome for the current cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub timestamp: DateTime<Utc>,
    pub item: Item,
    pub fields: PriceFields,
    pub status: ExtractionStatus,
    /// Strategy whose field set was accepted; `None` when nothing was read.
    pub strategy: Option<&'static str>,
    /// Classified failure summary for diagnostics when not `Success`.
    pub failure: Option<String>,
}

#[async_trait::async_trait]
pub trait ExtractionStrategy: Send + Sync {
    async fn attempt(&self, url: &str) -> Result<PriceFields, ExtractError>;
    fn name(&self) -> &'static str;
}

pub struct StrategyChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Run the chain for one item. Never fails: errors and empty scans fold
    /// into the result's status and failure summary.
    pub async fn extract(&self, item: &Item) -> ExtractionResult {
        let started = std::time::Instant::now();
        let mut best = PriceFields::default();
        let mut best_strategy: Option<&'static str> = None;
        let mut last_failure: Option<String> = None;
        let mut saw_error = false;

        for strategy in &self.strategies {
            counter!("extract_attempts_total", "strategy" => strategy.name()).increment(1);
            match strategy.attempt(&item.source_url).await {
                Ok(fields) if fields.is_complete() => {
                    best = fields;
                    best_strategy = Some(strategy.name());
                    break;
                }
                Ok(fields) => {
                    tracing::debug!(
                        target: "extract",
                        item = %item.name,
                        strategy = strategy.name(),
                        found = fields.count(),
                        "incomplete scan, trying next strategy"
                    );
                    if fields.count() > best.count() {
                        best = fields;
                        best_strategy = Some(strategy.name());
                    }
                }
                Err(e) => {
                    saw_error = true;
                    counter!("extract_errors_total", "strategy" => strategy.name(), "kind" => e.kind())
                        .increment(1);
                    tracing::warn!(
                        target: "extract",
                        item = %item.name,
                        strategy = strategy.name(),
                        error = %e,
                        "strategy attempt failed"
                    );
                    last_failure = Some(format!("{}: {e}", strategy.name()));
                }
            }
        }

        let status = if best.is_complete() {
            ExtractionStatus::Success
        } else if !best.is_empty() {
            ExtractionStatus::Partial
        } else {
            ExtractionStatus::Failed
        };

        if status == ExtractionStatus::Failed && !saw_error {
            // Every strategy loaded a page and none of them found a single
            // field: the page shape changed under us.
            counter!("extract_page_shape_total").increment(1);
            last_failure
                .get_or_insert_with(|| "page shape mismatch: no price fields found".to_string());
        }

        let failure = match status {
            ExtractionStatus::Success => None,
            _ => last_failure,
        };

        histogram!("extract_duration_ms").record(started.elapsed().as_millis() as f64);
        counter!("extract_items_total", "status" => status_label(status)).increment(1);

        ExtractionResult {
            timestamp: Utc::now(),
            item: item.clone(),
            fields: best,
            status,
            strategy: best_strategy,
            failure,
        }
    }
}

fn status_label(status: ExtractionStatus) -> &'static str {
    match status {
        ExtractionStatus::Success => "success",
        ExtractionStatus::Partial => "partial",
        ExtractionStatus::Failed => "failed",
    }
}
