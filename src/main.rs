//! Binary entrypoint: wires the roster source, the extraction chain and
//! the sheet sink, then runs the recurring sync cycle until ctrl-c.
//!
//! See `README.md` for quickstart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use futbin_price_tracker::extract::rendered::RenderedStrategy;
use futbin_price_tracker::extract::static_http::StaticStrategy;
use futbin_price_tracker::extract::StrategyChain;
use futbin_price_tracker::roster::file::FileRoster;
use futbin_price_tracker::roster::sheet::SheetRoster;
use futbin_price_tracker::roster::RosterSource;
use futbin_price_tracker::scheduler::{SchedulerCfg, SyncScheduler};
use futbin_price_tracker::settings::{RosterMode, Settings};
use futbin_price_tracker::sheets::rest::SheetsClient;
use futbin_price_tracker::sheets::SheetsApi;
use futbin_price_tracker::sink::SinkWriter;
use futbin_price_tracker::{metrics, roster};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config_arg = std::env::args().nth(1).map(PathBuf::from);
    let mut settings =
        Settings::load(config_arg.as_deref()).context("loading tracker settings")?;

    // A local roster file may carry a settings block; it applies now,
    // at startup only. The item list itself is re-read every cycle.
    if settings.roster.mode == RosterMode::File {
        let overrides = roster::file::read_settings_block(Path::new(&settings.roster.file))
            .context("reading roster file settings block")?;
        if let Some(overrides) = overrides {
            settings.merge_file_settings(&overrides);
        }
    }

    if let Some(listen) = settings.metrics_listen.as_deref() {
        metrics::install_exporter(listen)?;
    }
    metrics::describe_once();

    let spreadsheet_id = settings.sheets.spreadsheet_id.clone();
    ensure!(
        !spreadsheet_id.is_empty(),
        "spreadsheet id missing: set SPREADSHEET_ID or sheets.spreadsheet_id"
    );
    let token = std::env::var("SHEETS_API_TOKEN").context("SHEETS_API_TOKEN is required")?;
    let api: Arc<dyn SheetsApi> = Arc::new(SheetsClient::new(spreadsheet_id, token));

    let roster_source: Arc<dyn RosterSource> = match settings.roster.mode {
        RosterMode::Sheet => Arc::new(SheetRoster::new(api.clone(), settings.roster.tab.clone())),
        RosterMode::File => Arc::new(FileRoster::new(&settings.roster.file)),
    };

    let chain = StrategyChain::new(vec![
        Box::new(StaticStrategy::new(Duration::from_secs(
            settings.extract.http_timeout_secs,
        ))),
        Box::new(RenderedStrategy::new(settings.render_cfg())),
    ]);

    let mut sink = SinkWriter::new(api, settings.sink_cfg());
    if let Some(path) = &settings.outputs.csv_path {
        sink = sink.with_csv(path);
    }
    if let Some(path) = &settings.outputs.snapshot_path {
        sink = sink.with_snapshot(path);
    }
    if let Err(e) = sink.ensure_headers().await {
        tracing::warn!(error = %e, "header provisioning failed, continuing without it");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("ctrl-c received, finishing the current item before stopping");
                cancel.cancel();
            }
        });
    }

    let scheduler = SyncScheduler::new(
        roster_source,
        chain,
        sink,
        SchedulerCfg {
            interval: settings.interval(),
            item_delay: settings.item_delay(),
        },
    );
    scheduler.run(cancel).await;
    Ok(())
}
