// src/roster/sheet.rs
//! Roster source backed by a spreadsheet tab.

use std::sync::Arc;

use crate::sheets::SheetsApi;

use super::{item_from_row, RosterError, RosterSnapshot, RosterSource};

pub struct SheetRoster {
    api: Arc<dyn SheetsApi>,
    tab: String,
}

impl SheetRoster {
    pub fn new(api: Arc<dyn SheetsApi>, tab: impl Into<String>) -> Self {
        Self {
            api,
            tab: tab.into(),
        }
    }

    /// Data rows only; row 1 is the header.
    fn range(&self) -> String {
        format!("{}!A2:D", self.tab)
    }
}

#[async_trait::async_trait]
impl RosterSource for SheetRoster {
    async fn current(&self) -> Result<RosterSnapshot, RosterError> {
        let rows = self.api.read_range(&self.range()).await?;
        let items = rows.iter().filter_map(|r| item_from_row(r)).collect();
        Ok(RosterSnapshot::from_items(items))
    }

    fn describe(&self) -> String {
        format!("sheet tab {:?}", self.tab)
    }
}
