// src/extract/static_http.rs
//! Strategy 1: plain HTTP fetch, no script execution.
//!
//! Cheapest by far, so it always runs first. The site serves the full market
//! grid statically often enough for this to satisfy most cycles; when it
//! doesn't, the rendered strategy takes over.

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;

use super::page;
use super::{ExtractError, ExtractionStrategy, PriceFields};

/// Desktop browser profile; the site rejects default library user agents.
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

pub struct StaticStrategy {
    client: Client,
    timeout: Duration,
}

impl StaticStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl ExtractionStrategy for StaticStrategy {
    async fn attempt(&self, url: &str) -> Result<PriceFields, ExtractError> {
        let rsp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(USER_AGENT, BROWSER_UA)
            .header(ACCEPT, ACCEPT_HTML)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| ExtractError::Transport(format!("GET {url}: {e}")))?;

        let status = rsp.status();
        let body = rsp
            .text()
            .await
            .map_err(|e| ExtractError::Transport(format!("read body of {url}: {e}")))?;

        // Challenge pages come back as 403/429 or as a 200 interstitial.
        if page::looks_like_challenge(&body) || matches!(status.as_u16(), 403 | 429) {
            return Err(ExtractError::BotChallenge {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ExtractError::Transport(format!("GET {url}: status {status}")));
        }

        Ok(page::scan_document(&body))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
