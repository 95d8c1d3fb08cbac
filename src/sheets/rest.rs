// src/sheets/rest.rs
//! Google Sheets v4 REST client.
//!
//! Speaks the four endpoints the tracker needs: `values.get`,
//! `values.update`, `values.append` and `batchUpdate` (for dropdown rules),
//! plus a cached spreadsheet-metadata lookup to resolve tab titles into
//! numeric sheet ids. Consumes a ready bearer token; acquiring one is the
//! operator's problem.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde_json::{json, Value};

use super::{SheetsApi, SheetsError, ValidationTarget};

const DEFAULT_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct SheetsClient {
    base: String,
    spreadsheet_id: String,
    token: String,
    client: Client,
    timeout: Duration,
    /// Tab title -> sheetId. Only grows; a renamed tab shows up as a miss.
    sheet_ids: Mutex<HashMap<String, i64>>,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base: DEFAULT_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
            client: Client::new(),
            timeout: Duration::from_secs(15),
            sheet_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Build from `SPREADSHEET_ID` and `SHEETS_API_TOKEN`.
    pub fn from_env() -> anyhow::Result<Self> {
        let id = std::env::var("SPREADSHEET_ID").context("SPREADSHEET_ID is not set")?;
        let token = std::env::var("SHEETS_API_TOKEN").context("SHEETS_API_TOKEN is not set")?;
        Ok(Self::new(id, token))
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> Result<Value, SheetsError> {
        let rsp = req
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = rsp.status();
        if status.as_u16() == 429 {
            return Err(SheetsError::Quota);
        }
        let body = rsp.text().await?;
        if !status.is_success() {
            return Err(SheetsError::Api {
                status: status.as_u16(),
                message: api_message(&body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| SheetsError::Decode(e.to_string()))
    }

    /// Resolve a tab title to its numeric sheet id, via the metadata cache.
    async fn sheet_id(&self, tab: &str) -> Result<i64, SheetsError> {
        if let Some(id) = self.sheet_ids.lock().expect("sheet id cache mutex poisoned").get(tab) {
            return Ok(*id);
        }

        let url = format!("{}/{}?fields=sheets.properties", self.base, self.spreadsheet_id);
        let v = self.send_json(self.client.get(&url)).await?;

        let mut found = None;
        let mut cache = self.sheet_ids.lock().expect("sheet id cache mutex poisoned");
        if let Some(sheets) = v.pointer("/sheets").and_then(Value::as_array) {
            for sheet in sheets {
                let title = sheet.pointer("/properties/title").and_then(Value::as_str);
                let id = sheet.pointer("/properties/sheetId").and_then(Value::as_i64);
                let (Some(title), Some(id)) = (title, id) else {
                    continue;
                };
                cache.insert(title.to_string(), id);
                if title == tab {
                    found = Some(id);
                }
            }
        }
        found.ok_or_else(|| SheetsError::TabNotFound(tab.to_string()))
    }
}

#[async_trait::async_trait]
impl SheetsApi for SheetsClient {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>, SheetsError> {
        let url = format!("{}/{}/values/{}", self.base, self.spreadsheet_id, range);
        let v = self.send_json(self.client.get(&url)).await?;
        let rows = v
            .pointer("/values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|row| {
                row.as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(cell_text)
                    .collect()
            })
            .collect())
    }

    async fn update_range(&self, range: &str, rows: &[Vec<String>]) -> Result<(), SheetsError> {
        let url = format!("{}/{}/values/{}", self.base, self.spreadsheet_id, range);
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        self.send_json(
            self.client
                .put(&url)
                .query(&[("valueInputOption", "RAW")])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn append_rows(&self, range: &str, rows: &[Vec<String>]) -> Result<usize, SheetsError> {
        let url = format!("{}/{}/values/{}:append", self.base, self.spreadsheet_id, range);
        let body = json!({ "values": rows });
        let v = self
            .send_json(
                self.client
                    .post(&url)
                    .query(&[
                        ("valueInputOption", "RAW"),
                        ("insertDataOption", "INSERT_ROWS"),
                    ])
                    .json(&body),
            )
            .await?;
        Ok(v.pointer("/updates/updatedRows")
            .and_then(Value::as_u64)
            .unwrap_or(rows.len() as u64) as usize)
    }

    async fn set_validation(
        &self,
        target: &ValidationTarget,
        allowed: &[String],
    ) -> Result<(), SheetsError> {
        let sheet_id = self.sheet_id(&target.tab).await?;

        // Omitting `rule` clears the validation; ONE_OF_LIST with zero
        // values would be rejected by the API.
        let mut request = json!({
            "setDataValidation": {
                "range": {
                    "sheetId": sheet_id,
                    "startRowIndex": target.start_row,
                    "startColumnIndex": target.column,
                    "endColumnIndex": target.column + 1
                }
            }
        });
        if !allowed.is_empty() {
            request["setDataValidation"]["rule"] = json!({
                "condition": {
                    "type": "ONE_OF_LIST",
                    "values": allowed
                        .iter()
                        .map(|v| json!({ "userEnteredValue": v }))
                        .collect::<Vec<_>>()
                },
                "showCustomUi": true,
                "strict": false
            });
        }

        let url = format!("{}/{}:batchUpdate", self.base, self.spreadsheet_id);
        self.send_json(self.client.post(&url).json(&json!({ "requests": [request] })))
            .await?;
        Ok(())
    }
}

fn cell_text(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_prefers_the_structured_error() {
        let body = r#"{"error": {"code": 403, "message": "The caller does not have permission"}}"#;
        assert_eq!(api_message(body), "The caller does not have permission");
        assert_eq!(api_message("plain failure"), "plain failure");
    }

    #[test]
    fn cell_text_flattens_typed_cells() {
        assert_eq!(cell_text(json!("54,000")), "54,000");
        assert_eq!(cell_text(json!(54000)), "54000");
        assert_eq!(cell_text(Value::Null), "");
    }
}
