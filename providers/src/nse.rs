//! NSE archive download of the listed-equity CSV.

use std::time::Duration;

use reqwest::Url;
use tally_utils::CsvTable;

use crate::retry::{RetryConfig, send_with_retry};
use crate::{BROWSER_USER_AGENT, ProviderError, http_client, into_response};

const SERVICE: &str = "nse";

#[derive(Debug, Clone)]
pub struct NseClient {
    http: reqwest::Client,
    list_url: Url,
    retry: RetryConfig,
}

impl NseClient {
    pub fn new(list_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let list_url = Url::parse(list_url).map_err(|_| ProviderError::InvalidUrl {
            service: SERVICE,
            url: list_url.to_string(),
        })?;
        Ok(Self {
            http: http_client(timeout, Some(BROWSER_USER_AGENT))?,
            list_url,
            retry: RetryConfig::default(),
        })
    }

    /// Raw symbols from the `SYMBOL` column, or the first column when absent.
    pub async fn equity_symbols(&self) -> Result<Vec<String>, ProviderError> {
        let outcome =
            send_with_retry(|| self.http.get(self.list_url.clone()), &self.retry).await;
        let response = into_response(outcome, SERVICE).await?;
        let text = response.text().await.map_err(|e| ProviderError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;
        let symbols = symbols_from_csv(&text)?;
        tracing::info!(count = symbols.len(), "loaded NSE equity list");
        Ok(symbols)
    }
}

pub fn symbols_from_csv(text: &str) -> Result<Vec<String>, ProviderError> {
    let table = CsvTable::parse(text).map_err(|e| ProviderError::Decode {
        service: SERVICE,
        message: format!("equity list CSV: {e}"),
    })?;
    let idx = table.column("SYMBOL").unwrap_or(0);
    Ok(table
        .column_values(idx)
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect())
}
