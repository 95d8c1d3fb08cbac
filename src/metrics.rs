// src/metrics.rs
//! Metrics registration and the optional Prometheus exporter.

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on the exporter).
pub fn describe_once() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cycle_total", "Sync cycles started.");
        describe_counter!(
            "cycle_overruns_total",
            "Cycles that ran past the configured interval."
        );
        describe_counter!(
            "roster_fetch_failures_total",
            "Roster snapshot reads that failed."
        );
        describe_counter!(
            "extract_attempts_total",
            "Strategy attempts, labeled by strategy."
        );
        describe_counter!(
            "extract_errors_total",
            "Strategy attempt errors, labeled by strategy and kind."
        );
        describe_counter!("extract_items_total", "Extraction results, labeled by status.");
        describe_counter!(
            "extract_page_shape_total",
            "Items whose pages loaded but carried no readable price field."
        );
        describe_counter!("sink_rows_appended_total", "Rows appended to the data tab.");
        describe_counter!(
            "sink_append_failures_total",
            "Batch appends that exhausted their retries."
        );
        describe_counter!("sink_quota_hits_total", "Sheets quota (HTTP 429) responses.");
        describe_counter!(
            "sink_validation_refreshes_total",
            "Dropdown rule rebuilds that completed."
        );
        describe_counter!(
            "sink_local_write_failures_total",
            "CSV mirror or snapshot writes that failed."
        );
        describe_histogram!("extract_duration_ms", "Per-item extraction time in milliseconds.");
        describe_histogram!("cycle_duration_ms", "Full cycle time in milliseconds.");
        describe_gauge!("roster_items", "Items in the latest roster snapshot.");
        describe_gauge!("cycle_last_run_ts", "Unix ts when the last cycle finished.");
    });
}

/// Install the Prometheus recorder with its built-in HTTP listener.
/// Must run inside the tokio runtime.
pub fn install_exporter(listen: &str) -> Result<()> {
    let addr: std::net::SocketAddr = listen
        .parse()
        .with_context(|| format!("metrics_listen {listen:?} is not host:port"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("prometheus: install exporter")?;
    tracing::info!(target: "metrics", listen = %addr, "prometheus exporter up");
    Ok(())
}
