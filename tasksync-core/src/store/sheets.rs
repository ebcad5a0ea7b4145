//! Google Sheets v4 row store.
//!
//! Values are written with `valueInputOption=RAW` so timestamps stay plain
//! text and compare exactly on the next run.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::{StoreError, StoreResult};
use crate::event::{PersistedRow, ROW_WIDTH, RowRef};
use crate::store::{CellRef, CellValue, RowStore, SheetRef, TokenSource, column_letters};

pub const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com/v4/";

/// Connection settings for a spreadsheet.
#[derive(Debug, Clone, Default)]
pub struct SheetsConfig {
    /// Spreadsheet URL or bare id.
    pub spreadsheet: String,
    /// Title of the event sheet; the first sheet when unset.
    pub events_sheet: Option<String>,
    /// Title of the log sheet; the second sheet when unset.
    pub log_sheet: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    properties: DocumentProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct DocumentProperties {
    title: String,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct SheetsStore {
    http: reqwest::Client,
    base: Url,
    token: TokenSource,
    title: String,
    events_sheet: SheetRef,
    log_sheet: SheetRef,
    pending: Mutex<HashMap<SheetRef, Vec<(CellRef, String)>>>,
}

impl SheetsStore {
    /// Open the spreadsheet and resolve the event and log sheets.
    pub async fn connect(config: &SheetsConfig, token: TokenSource) -> StoreResult<Self> {
        let id = spreadsheet_id(&config.spreadsheet)?;
        let api_base = config.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);

        let mut base = Url::parse(api_base)
            .map_err(|e| StoreError::Config(format!("Invalid API base '{api_base}': {e}")))?;
        base.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("Invalid API base '{api_base}'")))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&id);

        let http = reqwest::Client::new();

        let mut meta_url = base.clone();
        meta_url
            .query_pairs_mut()
            .append_pair("fields", "properties.title,sheets.properties");
        let resp = http
            .get(meta_url)
            .bearer_auth(token.token().await?)
            .send()
            .await?;
        let meta: SpreadsheetMeta = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        let events_sheet = resolve_sheet(&meta.sheets, config.events_sheet.as_deref(), 0)?;
        let log_sheet = resolve_sheet(&meta.sheets, config.log_sheet.as_deref(), 1)?;

        info!(
            document = %meta.properties.title,
            events_sheet = %events_sheet,
            log_sheet = %log_sheet,
            "accessed spreadsheet"
        );

        Ok(SheetsStore {
            http,
            base,
            token,
            title: meta.properties.title,
            events_sheet,
            log_sheet,
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn events_sheet(&self) -> &SheetRef {
        &self.events_sheet
    }

    pub fn log_sheet(&self) -> &SheetRef {
        &self.log_sheet
    }

    fn values_url(&self, segment: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("values").push(segment);
        }
        url
    }

    fn batch_update_url(&self) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push("values:batchUpdate");
        }
        url
    }

    async fn append(&self, range: &str, values: Value) -> StoreResult<()> {
        let mut url = self.values_url(&format!("{range}:append"));
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let resp = self
            .http
            .post(url)
            .bearer_auth(self.token.token().await?)
            .json(&json!({ "majorDimension": "ROWS", "values": values }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn read_range(&self, range: &str) -> StoreResult<Vec<Vec<String>>> {
        let resp = self
            .http
            .get(self.values_url(range))
            .bearer_auth(self.token.token().await?)
            .send()
            .await?;
        let body: ValueRange = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }
}

#[async_trait]
impl RowStore for SheetsStore {
    async fn list_rows(&self, sheet: &SheetRef) -> StoreResult<Vec<PersistedRow>> {
        let range = format!("{}!A2:{}", sheet.quoted(), column_letters(ROW_WIDTH - 1));
        let rows = self.read_range(&range).await?;

        debug!(sheet = %sheet, rows = rows.len(), "listed rows");
        // Data starts on sheet row 2
        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, cells)| PersistedRow::from_cells(RowRef(i + 2), cells))
            .collect())
    }

    async fn append_rows(&self, sheet: &SheetRef, rows: &[Vec<String>]) -> StoreResult<()> {
        let range = format!("{}!A1:{}", sheet.quoted(), column_letters(ROW_WIDTH - 1));
        self.append(&range, json!(rows)).await
    }

    async fn update_row(&self, sheet: &SheetRef, row: RowRef, cells: &[String]) -> StoreResult<()> {
        let last = column_letters(cells.len().max(1) - 1);
        let range = format!("{}!A{}:{}{}", sheet.quoted(), row.0, last, row.0);

        let mut url = self.values_url(&range);
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let resp = self
            .http
            .put(url)
            .bearer_auth(self.token.token().await?)
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": [cells] }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn append_log_row(&self, sheet: &SheetRef, cells: &[CellValue]) -> StoreResult<()> {
        let last = column_letters(cells.len().max(1) - 1);
        let range = format!("{}!A1:{}", sheet.quoted(), last);
        self.append(&range, json!([cells])).await
    }

    async fn get_cell(&self, sheet: &SheetRef, cell: CellRef) -> StoreResult<Option<String>> {
        let pending = self
            .pending
            .lock()
            .await
            .get(sheet)
            .and_then(|writes| writes.iter().rev().find(|(c, _)| *c == cell))
            .map(|(_, v)| v.clone());
        if pending.is_some() {
            return Ok(pending);
        }

        let range = format!("{}!{}", sheet.quoted(), cell.a1());
        let rows = self.read_range(&range).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .filter(|v| !v.is_empty()))
    }

    async fn set_cell(&self, sheet: &SheetRef, cell: CellRef, value: String) -> StoreResult<()> {
        self.pending
            .lock()
            .await
            .entry(sheet.clone())
            .or_default()
            .push((cell, value));
        Ok(())
    }

    async fn flush_cell_writes(&self, sheet: &SheetRef) -> StoreResult<()> {
        let writes = self
            .pending
            .lock()
            .await
            .get(sheet)
            .cloned()
            .unwrap_or_default();
        if writes.is_empty() {
            return Ok(());
        }

        let data: Vec<Value> = writes
            .iter()
            .map(|(cell, value)| {
                json!({
                    "range": format!("{}!{}", sheet.quoted(), cell.a1()),
                    "values": [[value]],
                })
            })
            .collect();

        let resp = self
            .http
            .post(self.batch_update_url())
            .bearer_auth(self.token.token().await?)
            .json(&json!({ "valueInputOption": "RAW", "data": data }))
            .send()
            .await?;
        check(resp).await?;

        // Only drop what was sent; writes buffered meanwhile stay queued
        if let Some(queued) = self.pending.lock().await.get_mut(sheet) {
            queued.drain(..writes.len().min(queued.len()));
        }
        debug!(sheet = %sheet, cells = writes.len(), "flushed cell writes");
        Ok(())
    }
}

/// Map a non-success response to a `StoreError`.
async fn check(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(StoreError::RateLimited);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.error.message)
        .unwrap_or(text);
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn resolve_sheet(
    sheets: &[SheetEntry],
    title: Option<&str>,
    index: usize,
) -> StoreResult<SheetRef> {
    let found = match title {
        Some(title) => sheets.iter().find(|s| s.properties.title == title),
        None => sheets.iter().find(|s| s.properties.index == index),
    };

    found
        .map(|s| SheetRef::new(s.properties.title.clone()))
        .ok_or_else(|| match title {
            Some(title) => StoreError::SheetNotFound(title.to_string()),
            None => StoreError::SheetNotFound(format!("sheet #{}", index + 1)),
        })
}

/// Extract the spreadsheet id from a `docs.google.com/spreadsheets/d/<id>/...` URL,
/// or accept a bare id.
pub fn spreadsheet_id(input: &str) -> StoreResult<String> {
    let input = input.trim();

    if let Ok(url) = Url::parse(input) {
        let id = url
            .path_segments()
            .and_then(|mut segments| {
                segments.by_ref().find(|s| *s == "d")?;
                segments.next()
            })
            .filter(|id| !id.is_empty());
        return id
            .map(str::to_string)
            .ok_or_else(|| StoreError::Config(format!("No spreadsheet id in '{input}'")));
    }

    if input.is_empty() || input.contains('/') {
        return Err(StoreError::Config(format!("Invalid spreadsheet reference '{input}'")));
    }
    Ok(input.to_string())
}
