// src/extract/price.rs
//! Price text normalization.
//!
//! Listing pages render prices in whatever format the site's own formatter
//! picked that week: "54,000", "$54,000", "54.5K", "1.2M", sometimes with
//! HTML entities still embedded. Everything funnels through [`parse_price`]
//! so both extraction strategies agree on what a price cell means.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PriceParseError {
    #[error("no numeric value in {0:?}")]
    NoDigits(String),
    #[error("negative value in {0:?}")]
    Negative(String),
}

static RE_NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9.]").unwrap());

/// Parse a raw price cell into a whole-coin amount.
///
/// Tolerates thousands separators, currency symbols (£ $ € ¥ ₹), surrounding
/// whitespace and HTML entities. `K`/`M` magnitude suffixes multiply by
/// 10^3 / 10^6 (case-insensitive). A minus sign ahead of the digits is
/// rejected rather than silently dropped.
pub fn parse_price(raw: &str) -> Result<u64, PriceParseError> {
    let decoded = html_escape::decode_html_entities(raw);
    let cleaned = decoded.trim().to_ascii_uppercase();

    let Some(first_digit) = cleaned.find(|c: char| c.is_ascii_digit()) else {
        return Err(PriceParseError::NoDigits(raw.trim().to_string()));
    };
    if cleaned[..first_digit].contains('-') {
        return Err(PriceParseError::Negative(raw.trim().to_string()));
    }

    let (multiplier, body) = if let Some(p) = cleaned.strip_suffix('K') {
        (1_000f64, p)
    } else if let Some(p) = cleaned.strip_suffix('M') {
        (1_000_000f64, p)
    } else {
        (1f64, cleaned.as_str())
    };

    let digits = RE_NON_NUMERIC.replace_all(body, "");
    let value: f64 = digits
        .parse()
        .map_err(|_| PriceParseError::NoDigits(raw.trim().to_string()))?;

    Ok((value * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_and_currency_do_not_matter() {
        for raw in ["54,000", "54000", "$54,000", " 54,000 ", "£54,000", "54 000"] {
            assert_eq!(parse_price(raw).unwrap(), 54_000, "raw = {raw:?}");
        }
    }

    #[test]
    fn magnitude_suffixes_scale() {
        assert_eq!(parse_price("54.5K").unwrap(), 54_500);
        assert_eq!(parse_price("54.5k").unwrap(), 54_500);
        assert_eq!(parse_price("1.2M").unwrap(), 1_200_000);
        assert_eq!(parse_price("2.3K").unwrap(), 2_300);
        assert_eq!(parse_price("12K").unwrap(), 12_000);
        assert_eq!(parse_price("€1.5M").unwrap(), 1_500_000);
    }

    #[test]
    fn html_entities_are_decoded_first() {
        assert_eq!(parse_price("54&nbsp;000").unwrap(), 54_000);
        assert_eq!(parse_price("&pound;750").unwrap(), 750);
    }

    #[test]
    fn zero_is_a_valid_price() {
        assert_eq!(parse_price("0").unwrap(), 0);
    }

    #[test]
    fn placeholders_report_no_digits() {
        for raw in ["", "   ", "-", "--", "N/A", "TBD"] {
            assert!(
                matches!(parse_price(raw), Err(PriceParseError::NoDigits(_))),
                "raw = {raw:?}"
            );
        }
    }

    #[test]
    fn leading_minus_is_rejected_not_stripped() {
        assert!(matches!(
            parse_price("-500"),
            Err(PriceParseError::Negative(_))
        ));
        assert!(matches!(
            parse_price("£-1,200"),
            Err(PriceParseError::Negative(_))
        ));
    }

    #[test]
    fn decimal_prices_round_to_whole_coins() {
        assert_eq!(parse_price("1234.4").unwrap(), 1_234);
        assert_eq!(parse_price("1234.6").unwrap(), 1_235);
    }
}
