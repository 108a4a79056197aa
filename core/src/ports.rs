//! Seams between the job engines and the outside world.
//!
//! Jobs are generic over these traits. The provider clients implement them for
//! production; [`crate::memory::MemorySheets`] and test fakes implement them for
//! tests.

use std::future::Future;

use tally_providers::ProviderError;
use tally_providers::kite::{Gtt, Holding, Instrument, KiteClient};
use tally_providers::sheets::{GridRange, Spreadsheet, parse_updated_range};
use tally_providers::yahoo::YahooClient;
use tally_types::{
    A1Range, GttOrderSpec, NumberFormat, Quote, Row, RowSpan, ValueInput, ValueRender,
    qualified_range,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error(transparent)]
    Api(#[from] ProviderError),
    #[error("tab '{0}' not found")]
    UnknownTab(String),
    #[error("invalid range {range}: {reason}")]
    InvalidRange { range: String, reason: String },
    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl SheetError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Api(err) => err.is_rate_limited(),
            Self::RateLimited(_) => true,
            Self::UnknownTab(_) | Self::InvalidRange { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Rejected(String),
}

/// Tab-addressed access to one spreadsheet.
pub trait SheetStore: Sync {
    /// Grid rows of the tab, populated or not.
    fn row_count(&self, tab: &str) -> impl Future<Output = Result<u32, SheetError>> + Send;

    /// Values of `range`. Trailing empty rows are not returned.
    fn get(
        &self,
        tab: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> impl Future<Output = Result<Vec<Row>, SheetError>> + Send;

    fn update(
        &self,
        tab: &str,
        range: &A1Range,
        rows: &[Row],
        input: ValueInput,
    ) -> impl Future<Output = Result<(), SheetError>> + Send;

    /// Append below the last populated row, inserting grid rows as needed.
    /// Returns the written span when the backend reports it.
    fn append(
        &self,
        tab: &str,
        rows: &[Row],
        input: ValueInput,
    ) -> impl Future<Output = Result<Option<RowSpan>, SheetError>> + Send;

    fn clear(
        &self,
        tab: &str,
        ranges: &[A1Range],
    ) -> impl Future<Output = Result<(), SheetError>> + Send;

    fn delete_rows(
        &self,
        tab: &str,
        span: RowSpan,
    ) -> impl Future<Output = Result<(), SheetError>> + Send;

    /// Grow the grid by `count` blank rows at the bottom.
    fn add_rows(&self, tab: &str, count: u32)
    -> impl Future<Output = Result<(), SheetError>> + Send;

    fn set_number_format(
        &self,
        tab: &str,
        range: &A1Range,
        format: &NumberFormat,
    ) -> impl Future<Output = Result<(), SheetError>> + Send;
}

/// GTT writes.
pub trait GttBroker: Sync {
    /// Place a trigger and return its broker id.
    fn place_gtt(
        &self,
        spec: &GttOrderSpec,
    ) -> impl Future<Output = Result<String, BrokerError>> + Send;

    fn modify_gtt(
        &self,
        gtt_id: &str,
        spec: &GttOrderSpec,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    fn delete_gtt(&self, gtt_id: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// Broker state reads used by the export and tick-size jobs.
pub trait BrokerReader: Sync {
    fn gtts(&self) -> impl Future<Output = Result<Vec<Gtt>, BrokerError>> + Send;
    fn holdings(&self) -> impl Future<Output = Result<Vec<Holding>, BrokerError>> + Send;
    fn instruments(&self) -> impl Future<Output = Result<Vec<Instrument>, BrokerError>> + Send;
}

pub trait QuoteSource: Sync {
    fn quote(&self, symbol: &str) -> impl Future<Output = Result<Quote, ProviderError>> + Send;
}

async fn sheet_id(sheet: &Spreadsheet, tab: &str) -> Result<i64, SheetError> {
    sheet
        .tab(tab)
        .await?
        .map(|t| t.sheet_id)
        .ok_or_else(|| SheetError::UnknownTab(tab.to_string()))
}

impl SheetStore for Spreadsheet {
    async fn row_count(&self, tab: &str) -> Result<u32, SheetError> {
        self.tab(tab)
            .await?
            .map(|t| t.grid_properties.row_count)
            .ok_or_else(|| SheetError::UnknownTab(tab.to_string()))
    }

    async fn get(
        &self,
        tab: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Vec<Row>, SheetError> {
        Ok(self.values_get(&qualified_range(tab, range), render).await?)
    }

    async fn update(
        &self,
        tab: &str,
        range: &A1Range,
        rows: &[Row],
        input: ValueInput,
    ) -> Result<(), SheetError> {
        Ok(self
            .values_update(&qualified_range(tab, range), rows, input)
            .await?)
    }

    async fn append(
        &self,
        tab: &str,
        rows: &[Row],
        input: ValueInput,
    ) -> Result<Option<RowSpan>, SheetError> {
        if rows.is_empty() {
            return Ok(None);
        }
        let updated = self
            .values_append(&qualified_range(tab, &A1Range::cell(1, 1)), rows, input)
            .await?;
        Ok(updated.as_deref().and_then(parse_updated_range))
    }

    async fn clear(&self, tab: &str, ranges: &[A1Range]) -> Result<(), SheetError> {
        let ranges: Vec<String> = ranges.iter().map(|r| qualified_range(tab, r)).collect();
        Ok(self.values_batch_clear(&ranges).await?)
    }

    async fn delete_rows(&self, tab: &str, span: RowSpan) -> Result<(), SheetError> {
        let sheet_id = sheet_id(self, tab).await?;
        Ok(Spreadsheet::delete_rows(self, sheet_id, span).await?)
    }

    async fn add_rows(&self, tab: &str, count: u32) -> Result<(), SheetError> {
        let sheet_id = sheet_id(self, tab).await?;
        Ok(self.append_rows(sheet_id, count).await?)
    }

    async fn set_number_format(
        &self,
        tab: &str,
        range: &A1Range,
        format: &NumberFormat,
    ) -> Result<(), SheetError> {
        let sheet_id = sheet_id(self, tab).await?;
        Ok(Spreadsheet::set_number_format(self, GridRange::from_a1(sheet_id, range), format).await?)
    }
}

impl GttBroker for KiteClient {
    async fn place_gtt(&self, spec: &GttOrderSpec) -> Result<String, BrokerError> {
        Ok(KiteClient::place_gtt(self, spec).await?)
    }

    async fn modify_gtt(&self, gtt_id: &str, spec: &GttOrderSpec) -> Result<(), BrokerError> {
        Ok(KiteClient::modify_gtt(self, gtt_id, spec).await?)
    }

    async fn delete_gtt(&self, gtt_id: &str) -> Result<(), BrokerError> {
        Ok(KiteClient::delete_gtt(self, gtt_id).await?)
    }
}

impl BrokerReader for KiteClient {
    async fn gtts(&self) -> Result<Vec<Gtt>, BrokerError> {
        Ok(KiteClient::gtts(self).await?)
    }

    async fn holdings(&self) -> Result<Vec<Holding>, BrokerError> {
        Ok(KiteClient::holdings(self).await?)
    }

    async fn instruments(&self) -> Result<Vec<Instrument>, BrokerError> {
        Ok(KiteClient::instruments(self).await?)
    }
}

impl QuoteSource for YahooClient {
    async fn quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        YahooClient::quote(self, symbol).await
    }
}
