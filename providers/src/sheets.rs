//! Google Sheets REST v4 client.
//!
//! Value reads and writes go through `spreadsheets.values.*`; structural edits
//! (row deletes, grid growth, number formats) go through one
//! `spreadsheets:batchUpdate` call each. Every request is rate limited and
//! retried.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::{RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tally_types::{A1Range, NumberFormat, Row, RowSpan, SpreadsheetId, ValueInput, ValueRender};

use crate::retry::{RetryConfig, send_with_retry};
use crate::throttle::RateLimiter;
use crate::{ProviderError, decode_json, endpoint, http_client, into_response, parse_base_url};

const SERVICE: &str = "sheets";

#[derive(Debug, Clone)]
pub struct SheetsClientConfig {
    pub base_url: String,
    pub access_token: String,
    pub max_requests_per_minute: u32,
    pub retry: RetryConfig,
    pub timeout: Duration,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
    retry: RetryConfig,
    limiter: RateLimiter,
}

/// Shared handle; cloning shares the HTTP pool and the rate limiter.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    inner: Arc<Inner>,
}

impl SheetsClient {
    pub fn new(config: SheetsClientConfig) -> Result<Self, ProviderError> {
        if config.access_token.trim().is_empty() {
            return Err(ProviderError::MissingCredentials("Google Sheets"));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                http: http_client(config.timeout, None)?,
                base_url: parse_base_url(&config.base_url, SERVICE)?,
                access_token: config.access_token,
                retry: config.retry,
                limiter: RateLimiter::per_minute(config.max_requests_per_minute),
            }),
        })
    }

    #[must_use]
    pub fn spreadsheet(&self, id: SpreadsheetId) -> Spreadsheet {
        Spreadsheet {
            client: self.clone(),
            id,
            tabs: Mutex::new(None),
        }
    }

    async fn send<F>(&self, build_request: F) -> Result<reqwest::Response, ProviderError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.inner.limiter.acquire().await;
        let outcome = send_with_retry(
            || build_request().bearer_auth(&self.inner.access_token),
            &self.inner.retry,
        )
        .await;
        into_response(outcome, SERVICE).await
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GridProperties {
    pub row_count: u32,
    pub column_count: u32,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TabProperties {
    #[serde(default)]
    pub sheet_id: i64,
    pub title: String,
    #[serde(default)]
    pub grid_properties: GridProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpreadsheetMetadata {
    #[serde(default)]
    pub properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpreadsheetProperties {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SheetEntry {
    properties: TabProperties,
}

impl SpreadsheetMetadata {
    pub fn tabs(&self) -> impl Iterator<Item = &TabProperties> {
        self.sheets.iter().map(|s| &s.properties)
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_range: Option<String>,
}

/// Zero-based, end-exclusive grid coordinates used by `batchUpdate` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridRange {
    pub sheet_id: i64,
    pub start_row: u32,
    pub end_row: Option<u32>,
    pub start_column: u32,
    pub end_column: Option<u32>,
}

impl GridRange {
    #[must_use]
    pub fn from_a1(sheet_id: i64, range: &A1Range) -> Self {
        if range.is_whole() {
            return Self {
                sheet_id,
                start_row: 0,
                end_row: None,
                start_column: 0,
                end_column: None,
            };
        }
        Self {
            sheet_id,
            start_row: range.first_row() - 1,
            end_row: range.last_row(),
            start_column: range.first_col() - 1,
            end_column: Some(range.last_col()),
        }
    }

    fn to_json(self) -> Value {
        let mut grid = json!({
            "sheetId": self.sheet_id,
            "startRowIndex": self.start_row,
            "startColumnIndex": self.start_column,
        });
        if let Some(end) = self.end_row {
            grid["endRowIndex"] = json!(end);
        }
        if let Some(end) = self.end_column {
            grid["endColumnIndex"] = json!(end);
        }
        grid
    }
}

/// `batchUpdate` request bodies.
pub mod requests {
    use super::{GridRange, Value, json};
    use tally_types::{NumberFormat, RowSpan};

    /// Delete 1-based inclusive `span` rows.
    #[must_use]
    pub fn delete_rows(sheet_id: i64, span: RowSpan) -> Value {
        json!({
            "deleteDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": span.start - 1,
                    "endIndex": span.end,
                }
            }
        })
    }

    #[must_use]
    pub fn append_rows(sheet_id: i64, count: u32) -> Value {
        json!({
            "appendDimension": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "length": count,
            }
        })
    }

    #[must_use]
    pub fn number_format(range: GridRange, format: &NumberFormat) -> Value {
        json!({
            "repeatCell": {
                "range": range.to_json(),
                "cell": { "userEnteredFormat": { "numberFormat": format } },
                "fields": "userEnteredFormat.numberFormat",
            }
        })
    }
}

/// Row span of an `updatedRange` such as `'BANK_FINAL'!A120:G131`.
#[must_use]
pub fn parse_updated_range(updated: &str) -> Option<RowSpan> {
    let cells = updated.rsplit_once('!').map_or(updated, |(_, cells)| cells);
    let range = A1Range::parse(cells).ok()?;
    let last = range.last_row()?;
    Some(RowSpan::new(range.first_row(), last))
}

/// One spreadsheet, with a cache of its tab properties.
#[derive(Debug)]
pub struct Spreadsheet {
    client: SheetsClient,
    id: SpreadsheetId,
    tabs: Mutex<Option<Vec<TabProperties>>>,
}

impl Spreadsheet {
    #[must_use]
    pub fn id(&self) -> &SpreadsheetId {
        &self.id
    }

    fn url<I, S>(&self, segments: I) -> Result<Url, ProviderError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let base = endpoint(
            &self.client.inner.base_url,
            ["v4", "spreadsheets"],
            SERVICE,
        )?;
        endpoint(&base, segments, SERVICE)
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, ProviderError> {
        self.url([self.id.as_str(), "values", &format!("{range}{suffix}")])
    }

    /// Fetch title and tab properties, refreshing the cache.
    pub async fn metadata(&self) -> Result<SpreadsheetMetadata, ProviderError> {
        let url = self.url([self.id.as_str()])?;
        let http = &self.client.inner.http;
        let response = self
            .client
            .send(|| {
                http.get(url.clone())
                    .query(&[("fields", "properties.title,sheets.properties")])
            })
            .await?;
        let metadata: SpreadsheetMetadata = decode_json(response, SERVICE).await?;
        *self.tabs.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(metadata.tabs().cloned().collect());
        Ok(metadata)
    }

    /// Properties of a tab by title. Cached until [`Spreadsheet::invalidate`].
    pub async fn tab(&self, title: &str) -> Result<Option<TabProperties>, ProviderError> {
        let cached = self
            .tabs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tabs| tabs.iter().find(|t| t.title == title).cloned());
        if let Some(found) = cached {
            return Ok(found);
        }
        let metadata = self.metadata().await?;
        Ok(metadata.tabs().find(|t| t.title == title).cloned())
    }

    /// Drop cached tab properties after a structural change.
    pub fn invalidate(&self) {
        *self.tabs.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn values_get(
        &self,
        range: &str,
        render: ValueRender,
    ) -> Result<Vec<Row>, ProviderError> {
        let url = self.values_url(range, "")?;
        let http = &self.client.inner.http;
        let response = self
            .client
            .send(|| {
                http.get(url.clone())
                    .query(&[("valueRenderOption", render.as_str())])
            })
            .await?;
        let body: ValueRange = decode_json(response, SERVICE).await?;
        tracing::debug!(range, rows = body.values.len(), "values get");
        Ok(body.values)
    }

    pub async fn values_update(
        &self,
        range: &str,
        rows: &[Row],
        input: ValueInput,
    ) -> Result<(), ProviderError> {
        let url = self.values_url(range, "")?;
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let http = &self.client.inner.http;
        self.client
            .send(|| {
                http.put(url.clone())
                    .query(&[("valueInputOption", input.as_str())])
                    .json(&body)
            })
            .await?;
        tracing::debug!(range, rows = rows.len(), "values update");
        Ok(())
    }

    /// Append below the table found in `range`. Returns the API's `updatedRange`.
    pub async fn values_append(
        &self,
        range: &str,
        rows: &[Row],
        input: ValueInput,
    ) -> Result<Option<String>, ProviderError> {
        let url = self.values_url(range, ":append")?;
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        let http = &self.client.inner.http;
        let response = self
            .client
            .send(|| {
                http.post(url.clone())
                    .query(&[
                        ("valueInputOption", input.as_str()),
                        ("insertDataOption", "INSERT_ROWS"),
                    ])
                    .json(&body)
            })
            .await?;
        let body: AppendResponse = decode_json(response, SERVICE).await?;
        self.invalidate();
        let updated = body.updates.and_then(|u| u.updated_range);
        tracing::debug!(range, rows = rows.len(), updated = ?updated, "values append");
        Ok(updated)
    }

    pub async fn values_batch_clear(&self, ranges: &[String]) -> Result<(), ProviderError> {
        if ranges.is_empty() {
            return Ok(());
        }
        let url = self.url([format!("{}:batchClear", self.id.as_str())].iter())?;
        let body = json!({ "ranges": ranges });
        let http = &self.client.inner.http;
        self.client
            .send(|| http.post(url.clone()).json(&body))
            .await?;
        tracing::debug!(ranges = ?ranges, "values batch clear");
        Ok(())
    }

    pub async fn batch_update(&self, requests: Vec<Value>) -> Result<(), ProviderError> {
        if requests.is_empty() {
            return Ok(());
        }
        let url = self.url([format!("{}:batchUpdate", self.id.as_str())].iter())?;
        let body = json!({ "requests": requests });
        let http = &self.client.inner.http;
        self.client
            .send(|| http.post(url.clone()).json(&body))
            .await?;
        self.invalidate();
        Ok(())
    }

    pub async fn delete_rows(&self, sheet_id: i64, span: RowSpan) -> Result<(), ProviderError> {
        self.batch_update(vec![requests::delete_rows(sheet_id, span)])
            .await
    }

    pub async fn append_rows(&self, sheet_id: i64, count: u32) -> Result<(), ProviderError> {
        if count == 0 {
            return Ok(());
        }
        self.batch_update(vec![requests::append_rows(sheet_id, count)])
            .await
    }

    pub async fn set_number_format(
        &self,
        range: GridRange,
        format: &NumberFormat,
    ) -> Result<(), ProviderError> {
        self.batch_update(vec![requests::number_format(range, format)])
            .await
    }
}
