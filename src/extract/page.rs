// src/extract/page.rs
//! DOM scans over a fetched market page.
//!
//! Both strategies hand their body here, so a statically fetched page and a
//! rendered one are read identically. `scraper::Html` is not `Send`; every
//! function in this module is synchronous and no parsed document may cross
//! an await point.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::price::parse_price;
use super::PriceFields;

static SEL_CHEAPEST: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.market-grid-cheapest-sale div.standard-font").unwrap());
static SEL_AVERAGE_BIN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.market-grid-average-bin div.standard-font").unwrap());
static SEL_EA_AVG: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.market-grid-ea-avg div.standard-font").unwrap());
static SEL_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.market-grid-container-title").unwrap());
static SEL_VALUE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.standard-font").unwrap());

const LABEL_CHEAPEST: &str = "Cheapest Sale";
const LABEL_AVERAGE_BIN: &str = "Average BIN";
const LABEL_EA_AVG: &str = "EA Avg";

/// Phrases the site's anti-bot interstitial pages carry. Lowercase; matched
/// against a lowercased body.
const CHALLENGE_MARKERS: &[&str] = &[
    "just a moment",
    "checking your browser",
    "verify you are human",
    "attention required! | cloudflare",
    "cf-chl-widget",
    "challenge-platform",
];

/// True when the body is a bot-challenge interstitial rather than a market page.
pub fn looks_like_challenge(body: &str) -> bool {
    let lower = body.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Scan a page body for the three market-price fields.
///
/// Fixed selectors are tried first; when the site reshuffles its grid the
/// label-proximity fallback finds each price by its visible caption instead.
/// Unreadable cells leave their field empty, they never fail the scan.
pub fn scan_document(body: &str) -> PriceFields {
    let doc = Html::parse_document(body);
    PriceFields {
        cheapest_sale: field_value(&doc, &SEL_CHEAPEST, LABEL_CHEAPEST),
        average_buy_now: field_value(&doc, &SEL_AVERAGE_BIN, LABEL_AVERAGE_BIN),
        reference_average: field_value(&doc, &SEL_EA_AVG, LABEL_EA_AVG),
    }
}

fn field_value(doc: &Html, fixed: &Selector, label: &str) -> Option<u64> {
    let raw = doc
        .select(fixed)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| label_lookup(doc, label))?;

    match parse_price(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(target: "extract", field = label, raw = %raw, error = %e, "unreadable price cell");
            None
        }
    }
}

/// Fallback: locate the caption element, walk up to its `market-grid-*`
/// container and take the first value cell inside it.
fn label_lookup(doc: &Html, label: &str) -> Option<String> {
    for title in doc.select(&SEL_TITLE) {
        let text = element_text(title);
        if !text.to_ascii_lowercase().contains(&label.to_ascii_lowercase()) {
            continue;
        }
        let container = title.ancestors().filter_map(ElementRef::wrap).find(|el| {
            el.value()
                .attr("class")
                .is_some_and(|c| c.contains("market-grid-") && !c.contains("container-title"))
        })?;
        let value = container
            .select(&SEL_VALUE)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty());
        if value.is_some() {
            return value;
        }
    }
    None
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}
