// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod extract;
pub mod metrics;
pub mod roster;
pub mod scheduler;
pub mod settings;
pub mod sheets;
pub mod sink;

// ---- Re-exports for stable public API ----
pub use crate::extract::{
    ExtractError, ExtractionResult, ExtractionStatus, ExtractionStrategy, PriceFields,
    StrategyChain,
};
pub use crate::roster::{Item, RosterSnapshot, RosterSource};
pub use crate::scheduler::{CycleTally, SchedulerCfg, SyncScheduler};
pub use crate::settings::Settings;
pub use crate::sheets::{MemorySheets, SheetsApi, SheetsError};
pub use crate::sink::{SinkCfg, SinkWriter, ValidationSet, WriteOutcome};
