// tests/scheduler_cycle.rs
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use futbin_price_tracker::extract::{
    ExtractError, ExtractionStrategy, PriceFields, StrategyChain,
};
use futbin_price_tracker::roster::file::FileRoster;
use futbin_price_tracker::roster::sheet::SheetRoster;
use futbin_price_tracker::roster::RosterSource;
use futbin_price_tracker::scheduler::{SchedulerCfg, SyncScheduler};
use futbin_price_tracker::sheets::{MemorySheets, SheetsApi, SheetsError};
use futbin_price_tracker::sink::{SinkCfg, SinkWriter};

#[derive(Clone)]
struct Scripted {
    name: &'static str,
    outcomes: Arc<Mutex<Vec<Result<PriceFields, ExtractError>>>>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn new(name: &'static str, outcomes: Vec<Result<PriceFields, ExtractError>>) -> Self {
        Self {
            name,
            outcomes: Arc::new(Mutex::new(outcomes)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ExtractionStrategy for Scripted {
    async fn attempt(&self, _url: &str) -> Result<PriceFields, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outcomes = self.outcomes.lock().unwrap();
        assert!(!outcomes.is_empty(), "strategy {} called too often", self.name);
        outcomes.remove(0)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Yields a complete field set and cancels the token from inside the
/// attempt, mimicking a shutdown that lands while an item is in flight.
struct CancelDuringAttempt {
    token: CancellationToken,
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ExtractionStrategy for CancelDuringAttempt {
    async fn attempt(&self, _url: &str) -> Result<PriceFields, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
        Ok(full_fields())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

fn full_fields() -> PriceFields {
    PriceFields {
        cheapest_sale: Some(9_800),
        average_buy_now: Some(12_289),
        reference_average: Some(13_125),
    }
}

fn chain_of(strategies: Vec<Box<dyn ExtractionStrategy>>) -> StrategyChain {
    StrategyChain::new(strategies)
}

fn quick_cfg() -> SchedulerCfg {
    SchedulerCfg {
        interval: Duration::from_secs(30),
        item_delay: Duration::ZERO,
    }
}

fn sink_for(api: &Arc<MemorySheets>) -> SinkWriter {
    let cfg = SinkCfg {
        backoff_base_ms: 1,
        ..SinkCfg::default()
    };
    SinkWriter::new(api.clone() as Arc<dyn SheetsApi>, cfg)
}

fn write_roster_file(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("roster.json");
    fs::write(&path, body).unwrap();
    path
}

const THREE_ITEM_ROSTER: &str = r#"{
    "items": [
        {"name": "Ronaldo", "url": "https://market.example/p/1", "notes": "Icon"},
        {"name": "Bellingham", "url": "https://market.example/p/2"},
        {"name": "Paused", "url": "https://market.example/p/3", "enabled": false}
    ]
}"#;

#[tokio::test]
async fn one_cycle_extracts_enabled_items_and_appends_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let roster = FileRoster::new(write_roster_file(&dir, THREE_ITEM_ROSTER));

    let strategy = Scripted::new(
        "static",
        vec![
            Ok(full_fields()),
            Ok(PriceFields {
                cheapest_sale: Some(1_200),
                average_buy_now: None,
                reference_average: None,
            }),
        ],
    );
    let api = Arc::new(MemorySheets::new());
    let mut scheduler = SyncScheduler::new(
        Arc::new(roster) as Arc<dyn RosterSource>,
        chain_of(vec![Box::new(strategy.clone())]),
        sink_for(&api),
        quick_cfg(),
    );

    let tally = scheduler.run_cycle(&CancellationToken::new()).await;

    assert!(tally.roster_ok);
    assert!(tally.write_ok);
    assert!(!tally.cancelled);
    assert_eq!(tally.success, 1);
    assert_eq!(tally.partial, 1);
    assert_eq!(tally.failed, 0);
    assert_eq!(tally.rows_appended, 2);
    assert_eq!(strategy.calls(), 2, "the disabled item is never visited");

    let state = api.state.lock().unwrap();
    let rows = &state.tabs["Prices"];
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1], "Ronaldo");
    assert_eq!(rows[0][2], "9800");
    assert_eq!(rows[1][1], "Bellingham");
    // Validation tracks the whole roster, paused items included.
    let names = &state.validations[&("Players".to_string(), 0)];
    assert_eq!(names, &["Bellingham", "Paused", "Ronaldo"]);
}

#[tokio::test]
async fn rendered_fallback_supplies_the_appended_row() {
    let dir = tempfile::tempdir().unwrap();
    let roster = FileRoster::new(write_roster_file(
        &dir,
        r#"{"items": [{"name": "Ronaldo", "url": "https://market.example/p/1"}]}"#,
    ));

    let static_strategy = Scripted::new("static", vec![Ok(PriceFields::default())]);
    let rendered_strategy = Scripted::new("rendered", vec![Ok(full_fields())]);
    let api = Arc::new(MemorySheets::new());
    let mut scheduler = SyncScheduler::new(
        Arc::new(roster) as Arc<dyn RosterSource>,
        chain_of(vec![
            Box::new(static_strategy.clone()),
            Box::new(rendered_strategy.clone()),
        ]),
        sink_for(&api),
        quick_cfg(),
    );

    let tally = scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(tally.success, 1);
    assert_eq!(rendered_strategy.calls(), 1);

    let state = api.state.lock().unwrap();
    let row = &state.tabs["Prices"][0];
    assert_eq!(&row[2..5], &["9800", "12289", "13125"]);
}

#[tokio::test]
async fn failed_items_never_suppress_the_rest_of_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let roster = FileRoster::new(write_roster_file(
        &dir,
        r#"{"items": [
            {"name": "Down", "url": "https://market.example/p/1"},
            {"name": "Up", "url": "https://market.example/p/2"}
        ]}"#,
    ));

    let strategy = Scripted::new(
        "static",
        vec![
            Err(ExtractError::Transport("connection reset".to_string())),
            Ok(full_fields()),
        ],
    );
    let api = Arc::new(MemorySheets::new());
    let mut scheduler = SyncScheduler::new(
        Arc::new(roster) as Arc<dyn RosterSource>,
        chain_of(vec![Box::new(strategy)]),
        sink_for(&api),
        quick_cfg(),
    );

    let tally = scheduler.run_cycle(&CancellationToken::new()).await;

    assert_eq!(tally.failed, 1);
    assert_eq!(tally.success, 1);
    assert_eq!(tally.rows_appended, 1);
    let state = api.state.lock().unwrap();
    assert_eq!(state.tabs["Prices"].len(), 1);
    assert_eq!(state.tabs["Prices"][0][1], "Up");
}

#[tokio::test]
async fn roster_failure_skips_extraction_and_writing() {
    let sheet_api = Arc::new(MemorySheets::new());
    sheet_api.push_read_failure(SheetsError::Quota);
    let roster = SheetRoster::new(sheet_api.clone() as Arc<dyn SheetsApi>, "Players");

    // Would panic if any extraction were attempted.
    let strategy = Scripted::new("static", vec![]);
    let mut scheduler = SyncScheduler::new(
        Arc::new(roster) as Arc<dyn RosterSource>,
        chain_of(vec![Box::new(strategy.clone())]),
        sink_for(&sheet_api),
        quick_cfg(),
    );

    let tally = scheduler.run_cycle(&CancellationToken::new()).await;

    assert!(!tally.roster_ok);
    assert!(!tally.write_ok);
    assert_eq!(tally.rows_appended, 0);
    assert_eq!(strategy.calls(), 0);
    let state = sheet_api.state.lock().unwrap();
    assert_eq!(state.append_calls, 0);
    assert_eq!(state.validation_calls, 0, "a skipped cycle touches nothing");
}

#[tokio::test]
async fn cancellation_mid_cycle_flushes_what_was_extracted() {
    let dir = tempfile::tempdir().unwrap();
    let roster = FileRoster::new(write_roster_file(&dir, THREE_ITEM_ROSTER));

    let cancel = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let strategy = CancelDuringAttempt {
        token: cancel.clone(),
        calls: calls.clone(),
    };
    let api = Arc::new(MemorySheets::new());
    let mut scheduler = SyncScheduler::new(
        Arc::new(roster) as Arc<dyn RosterSource>,
        chain_of(vec![Box::new(strategy)]),
        sink_for(&api),
        quick_cfg(),
    );

    let tally = scheduler.run_cycle(&cancel).await;

    assert!(tally.cancelled);
    assert_eq!(tally.success, 1, "the in-flight item finished");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "no further item started");
    assert_eq!(tally.rows_appended, 1, "the partial batch was still written");
    assert_eq!(api.state.lock().unwrap().tabs["Prices"].len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_loop_writes_then_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let roster = FileRoster::new(write_roster_file(
        &dir,
        r#"{"items": [{"name": "Ronaldo", "url": "https://market.example/p/1"}]}"#,
    ));

    let strategy = Scripted::new("static", vec![Ok(full_fields())]);
    let api = Arc::new(MemorySheets::new());
    let scheduler = SyncScheduler::new(
        Arc::new(roster) as Arc<dyn RosterSource>,
        chain_of(vec![Box::new(strategy)]),
        sink_for(&api),
        SchedulerCfg {
            interval: Duration::from_secs(3600),
            item_delay: Duration::ZERO,
        },
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(cancel.clone()));

    // Wait until the first cycle's batch lands, then cancel during the sleep.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if api
                .state
                .lock()
                .unwrap()
                .tabs
                .get("Prices")
                .is_some_and(|rows| !rows.is_empty())
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first cycle never wrote");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop after cancel")
        .unwrap();

    assert_eq!(api.state.lock().unwrap().tabs["Prices"].len(), 1);
}
