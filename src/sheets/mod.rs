// src/sheets/mod.rs
//! Capability trait over the spreadsheet store.
//!
//! Everything that touches the remote sheet goes through [`SheetsApi`]:
//! the REST client implements it for production and [`MemorySheets`] stands
//! in for tests, so roster reads, batch appends and validation refreshes are
//! all exercisable without a network.

pub mod rest;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("sheets transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sheets quota exhausted (HTTP 429)")]
    Quota,
    #[error("sheets api error: status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("sheet tab {0:?} not found in spreadsheet")]
    TabNotFound(String),
    #[error("sheets response decode: {0}")]
    Decode(String),
}

impl SheetsError {
    /// Worth another attempt after a backoff. Hard API errors are not.
    pub fn retryable(&self) -> bool {
        matches!(self, SheetsError::Quota | SheetsError::Transport(_))
    }
}

/// Where a dropdown rule lands: one column of one tab, from `start_row` down.
/// Indices are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidationTarget {
    pub tab: String,
    pub column: u32,
    pub start_row: u32,
}

#[async_trait::async_trait]
pub trait SheetsApi: Send + Sync {
    /// Read a range in A1 notation, e.g. `Players!A2:D`. Missing trailing
    /// cells may be absent from a row.
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError>;

    /// Overwrite a range with the given rows.
    async fn update_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), SheetsError>;

    /// Append rows after the current end of the table in `range`. Returns
    /// the number of rows written.
    async fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<usize, SheetsError>;

    /// Replace the dropdown rule on a column with the given allowed values.
    /// An empty list clears the rule.
    async fn set_validation(
        &self,
        target: &ValidationTarget,
        allowed: &[String],
    ) -> Result<(), SheetsError>;
}

// --- Test double ---

/// In-memory [`SheetsApi`] for tests: records all writes and can be primed
/// with rows and injected failures per operation.
#[derive(Default)]
pub struct MemorySheets {
    pub state: Mutex<MemoryState>,
}

#[derive(Default)]
pub struct MemoryState {
    /// Tab title -> rows (row 0 is the header row when present).
    pub tabs: HashMap<String, Vec<Vec<String>>>,
    /// (tab, column) -> allowed values of the current dropdown rule.
    pub validations: HashMap<(String, u32), Vec<String>>,
    pub append_calls: usize,
    pub update_calls: usize,
    pub validation_calls: usize,
    pub fail_read: VecDeque<SheetsError>,
    pub fail_append: VecDeque<SheetsError>,
    pub fail_validation: VecDeque<SheetsError>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prime a tab with rows (header included, as a real sheet would hold).
    pub fn with_tab(self, tab: &str, rows: Vec<Vec<&str>>) -> Self {
        self.state.lock().unwrap().tabs.insert(
            tab.to_string(),
            rows.into_iter()
                .map(|r| r.into_iter().map(str::to_string).collect())
                .collect(),
        );
        self
    }

    pub fn push_read_failure(&self, err: SheetsError) {
        self.state.lock().unwrap().fail_read.push_back(err);
    }

    pub fn push_append_failure(&self, err: SheetsError) {
        self.state.lock().unwrap().fail_append.push_back(err);
    }

    pub fn push_validation_failure(&self, err: SheetsError) {
        self.state.lock().unwrap().fail_validation.push_back(err);
    }
}

/// Split `Tab!A2:D` into the tab title and the zero-based start row.
fn split_range(range: &str) -> (String, usize) {
    let (tab, cells) = range.split_once('!').unwrap_or((range, ""));
    let start_row = cells
        .split(':')
        .next()
        .unwrap_or("")
        .chars()
        .skip_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .parse::<usize>()
        .map(|r| r.saturating_sub(1))
        .unwrap_or(0);
    (tab.to_string(), start_row)
}

#[async_trait::async_trait]
impl SheetsApi for MemorySheets {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_read.pop_front() {
            return Err(err);
        }
        let (tab, start_row) = split_range(range);
        let rows = state.tabs.get(&tab).cloned().unwrap_or_default();
        Ok(rows.into_iter().skip(start_row).collect())
    }

    async fn update_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        let (tab, start_row) = split_range(range);
        let sheet = state.tabs.entry(tab).or_default();
        if sheet.len() < start_row + rows.len() {
            sheet.resize(start_row + rows.len(), Vec::new());
        }
        for (i, row) in rows.iter().enumerate() {
            sheet[start_row + i] = row.clone();
        }
        Ok(())
    }

    async fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<usize, SheetsError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_append.pop_front() {
            return Err(err);
        }
        state.append_calls += 1;
        let (tab, _) = split_range(range);
        let sheet = state.tabs.entry(tab).or_default();
        sheet.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    async fn set_validation(
        &self,
        target: &ValidationTarget,
        allowed: &[String],
    ) -> Result<(), SheetsError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_validation.pop_front() {
            return Err(err);
        }
        state.validation_calls += 1;
        state
            .validations
            .insert((target.tab.clone(), target.column), allowed.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_range_handles_tab_and_start_row() {
        assert_eq!(split_range("Players!A2:D"), ("Players".to_string(), 1));
        assert_eq!(split_range("Prices!A1:G1"), ("Prices".to_string(), 0));
        assert_eq!(split_range("Data"), ("Data".to_string(), 0));
    }

    #[tokio::test]
    async fn memory_sheets_read_skips_to_start_row() {
        let api = MemorySheets::new().with_tab(
            "Players",
            vec![
                vec!["Name", "SourceLink", "Tag", "Enabled"],
                vec!["Ronaldo", "https://example.com/r", "Icon", "TRUE"],
            ],
        );
        let rows = api.read_range("Players!A2:D").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "Ronaldo");
    }

    #[tokio::test]
    async fn memory_sheets_injected_failure_fires_once() {
        let api = MemorySheets::new();
        api.push_append_failure(SheetsError::Quota);
        let rows = vec![vec!["a".to_string()]];
        assert!(api.append_rows("Prices!A2:G", &rows).await.is_err());
        assert_eq!(api.append_rows("Prices!A2:G", &rows).await.unwrap(), 1);
        assert_eq!(api.state.lock().unwrap().append_calls, 1);
    }
}
