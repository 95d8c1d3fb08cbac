// src/extract/rendered.rs
//! Strategy 2: fetch through a rendered browsing context.
//!
//! The market grid is sometimes populated client-side, so this strategy
//! drives a headless browser: navigate, then poll the rendered DOM until the
//! field set completes or the settle window runs out. Each attempt launches
//! its own browser and drops it before returning; a context is never shared
//! across items or cycles, and dropping the [`Browser`] kills the underlying
//! process on every exit path.
//!
//! The CDP client is synchronous, so the whole attempt runs inside
//! `spawn_blocking`.

use std::ffi::OsStr;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, LaunchOptions};

use super::page;
use super::{ExtractError, ExtractionStrategy, PriceFields};

#[derive(Debug, Clone)]
pub struct RenderCfg {
    pub headless: bool,
    /// Budget for launch + navigation.
    pub nav_timeout: Duration,
    /// How long to keep polling the DOM after navigation.
    pub settle: Duration,
    pub poll_interval: Duration,
    pub window: (u32, u32),
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            headless: true,
            nav_timeout: Duration::from_secs(30),
            settle: Duration::from_secs(12),
            poll_interval: Duration::from_millis(500),
            window: (1920, 1080),
        }
    }
}

pub struct RenderedStrategy {
    cfg: RenderCfg,
}

impl RenderedStrategy {
    pub fn new(cfg: RenderCfg) -> Self {
        Self { cfg }
    }
}

#[async_trait::async_trait]
impl ExtractionStrategy for RenderedStrategy {
    async fn attempt(&self, url: &str) -> Result<PriceFields, ExtractError> {
        let cfg = self.cfg.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || render_and_scan(&cfg, &url))
            .await
            .map_err(|e| ExtractError::Render(format!("render worker: {e}")))?
    }

    fn name(&self) -> &'static str {
        "rendered"
    }
}

fn render_and_scan(cfg: &RenderCfg, url: &str) -> Result<PriceFields, ExtractError> {
    let options = LaunchOptions::default_builder()
        .headless(cfg.headless)
        .sandbox(false)
        .window_size(Some(cfg.window))
        .args(vec![
            OsStr::new("--disable-gpu"),
            OsStr::new("--disable-dev-shm-usage"),
        ])
        .idle_browser_timeout(cfg.nav_timeout + cfg.settle + Duration::from_secs(30))
        .build()
        .map_err(|e| ExtractError::Render(format!("launch options: {e}")))?;

    let browser =
        Browser::new(options).map_err(|e| ExtractError::Render(format!("launch browser: {e}")))?;
    let tab = browser
        .new_tab()
        .map_err(|e| ExtractError::Render(format!("open tab: {e}")))?;
    tab.set_default_timeout(cfg.nav_timeout);

    tab.navigate_to(url)
        .map_err(|e| ExtractError::Transport(format!("navigate {url}: {e}")))?;
    tab.wait_until_navigated()
        .map_err(|e| ExtractError::Transport(format!("navigation wait {url}: {e}")))?;

    // Poll until complete or the settle window expires. A challenge page can
    // clear mid-window when the interstitial resolves itself, so only the
    // final state counts.
    let deadline = Instant::now() + cfg.settle;
    let mut best = PriceFields::default();
    let challenged = loop {
        let body = tab
            .get_content()
            .map_err(|e| ExtractError::Render(format!("read DOM of {url}: {e}")))?;
        let challenged_now = page::looks_like_challenge(&body);
        if !challenged_now {
            let fields = page::scan_document(&body);
            if fields.count() > best.count() {
                best = fields;
            }
            if best.is_complete() {
                break false;
            }
        }
        if Instant::now() >= deadline {
            break challenged_now;
        }
        std::thread::sleep(cfg.poll_interval);
    };

    if challenged && best.is_empty() {
        return Err(ExtractError::BotChallenge {
            url: url.to_string(),
        });
    }
    Ok(best)
}
