//! Yahoo Finance chart endpoint, used as a single-symbol quote source.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tally_types::{Quote, yahoo_symbol};

use crate::retry::{RetryConfig, send_with_retry};
use crate::{
    BROWSER_USER_AGENT, ProviderError, decode_json, endpoint, http_client, into_response,
    parse_base_url,
};

const SERVICE: &str = "yahoo";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChartMeta {
    regular_market_price: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    long_name: Option<String>,
    short_name: Option<String>,
}

impl ChartMeta {
    fn into_quote(self, symbol: &str) -> Quote {
        let previous_close = self.previous_close.or(self.chart_previous_close);
        Quote {
            symbol: symbol.to_string(),
            company_name: self.long_name.or(self.short_name).unwrap_or_default(),
            current_price: self.regular_market_price.or(previous_close),
            previous_close,
            day_high: self.regular_market_day_high,
            day_low: self.regular_market_day_low,
            week52_high: self.fifty_two_week_high,
            week52_low: self.fifty_two_week_low,
            volume: self.regular_market_volume,
            last_updated: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct YahooClient {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryConfig,
}

impl YahooClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(timeout, Some(BROWSER_USER_AGENT))?,
            base_url: parse_base_url(base_url, SERVICE)?,
            retry: RetryConfig::no_retry(),
        })
    }

    /// Quote for an `NSE:`-prefixed symbol. `last_updated` is left for the caller.
    pub async fn quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let ticker = yahoo_symbol(symbol);
        let url = endpoint(
            &self.base_url,
            ["v8", "finance", "chart", ticker.as_str()],
            SERVICE,
        )?;
        let outcome = send_with_retry(
            || {
                self.http
                    .get(url.clone())
                    .query(&[("range", "1d"), ("interval", "1d")])
            },
            &self.retry,
        )
        .await;
        let response = into_response(outcome, SERVICE).await?;
        let body: ChartResponse = decode_json(response, SERVICE).await?;

        if let Some(err) = body.chart.error {
            return Err(ProviderError::Decode {
                service: SERVICE,
                message: format!("{ticker}: {} {}", err.code, err.description),
            });
        }
        let meta = body
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .map(|r| r.meta)
            .ok_or_else(|| ProviderError::Decode {
                service: SERVICE,
                message: format!("{ticker}: empty chart result"),
            })?;
        let quote = meta.into_quote(symbol);
        if quote.current_price.is_none() {
            return Err(ProviderError::Decode {
                service: SERVICE,
                message: format!("{ticker}: no price"),
            });
        }
        Ok(quote)
    }
}
