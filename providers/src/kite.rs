//! Zerodha Kite Connect v3 client.
//!
//! Every JSON response is wrapped in `{"status", "data", "message", "error_type"}`.
//! GTT writes are form-encoded with JSON-valued `condition` and `orders` fields.

use std::time::Duration;

use reqwest::{RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tally_types::GttOrderSpec;
use tally_utils::CsvTable;

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::{ProviderError, endpoint, http_client, parse_base_url, read_capped_error_body};

const SERVICE: &str = "kite";
const API_VERSION: &str = "3";

#[derive(Debug, Clone)]
pub struct KiteClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub access_token: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: String,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_type: Option<String>,
}

impl<T> Envelope<T> {
    fn error_message(&self) -> String {
        let message = self.message.as_deref().unwrap_or("request failed");
        match &self.error_type {
            Some(kind) => format!("{kind}: {message}"),
            None => message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Profile {
    pub user_id: String,
    pub user_name: String,
    pub email: String,
    pub broker: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct GttCondition {
    pub exchange: String,
    pub tradingsymbol: String,
    pub trigger_values: Vec<f64>,
    pub last_price: f64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct GttOrder {
    pub exchange: String,
    pub tradingsymbol: String,
    pub transaction_type: String,
    pub quantity: i64,
    pub order_type: String,
    pub product: String,
    pub price: f64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Gtt {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub condition: GttCondition,
    pub orders: Vec<GttOrder>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Holding {
    pub tradingsymbol: String,
    pub exchange: String,
    pub isin: String,
    pub quantity: i64,
    pub used_quantity: i64,
    pub t1_quantity: i64,
    pub average_price: f64,
    pub last_price: f64,
    pub pnl: f64,
    pub product: String,
}

/// One row of the `/instruments` CSV dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub instrument_token: u64,
    pub tradingsymbol: String,
    pub name: String,
    pub tick_size: f64,
    pub lot_size: u32,
    pub instrument_type: String,
    pub segment: String,
    pub exchange: String,
}

impl Instrument {
    /// `EXCHANGE:TRADINGSYMBOL`, the form tickers take in the sheets.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.exchange, self.tradingsymbol)
    }
}

/// Parse the instruments CSV. Rows without a tradingsymbol or exchange are dropped.
pub fn parse_instruments(text: &str) -> Result<Vec<Instrument>, ProviderError> {
    let table = CsvTable::parse(text).map_err(|e| ProviderError::Decode {
        service: SERVICE,
        message: format!("instruments CSV: {e}"),
    })?;
    let col = |name: &str| table.column(name);
    let (Some(symbol), Some(exchange)) = (col("tradingsymbol"), col("exchange")) else {
        tracing::warn!("instruments dump has no tradingsymbol/exchange columns");
        return Ok(Vec::new());
    };
    let token = col("instrument_token");
    let name = col("name");
    let tick = col("tick_size");
    let lot = col("lot_size");
    let kind = col("instrument_type");
    let segment = col("segment");

    let field = |row: &[String], idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let instruments = table
        .rows
        .iter()
        .filter_map(|row| {
            let tradingsymbol = field(row, Some(symbol));
            let exchange = field(row, Some(exchange));
            if tradingsymbol.is_empty() || exchange.is_empty() {
                return None;
            }
            Some(Instrument {
                instrument_token: field(row, token).parse().unwrap_or(0),
                tradingsymbol,
                name: field(row, name),
                tick_size: field(row, tick).parse().unwrap_or(0.0),
                lot_size: field(row, lot).parse().unwrap_or(0),
                instrument_type: field(row, kind),
                segment: field(row, segment),
                exchange,
            })
        })
        .collect();
    Ok(instruments)
}

#[derive(Debug, Deserialize)]
struct TriggerId {
    trigger_id: i64,
}

/// Form body shared by place and modify.
fn gtt_form(spec: &GttOrderSpec) -> Vec<(&'static str, String)> {
    let condition = json!({
        "exchange": spec.exchange,
        "tradingsymbol": spec.symbol,
        "trigger_values": [spec.trigger_price],
        "last_price": spec.last_price,
    });
    let mut order = json!({
        "exchange": spec.exchange,
        "tradingsymbol": spec.symbol,
        "transaction_type": spec.side.as_str(),
        "quantity": spec.quantity,
        "order_type": "LIMIT",
        "product": "CNC",
        "price": spec.limit_price,
    });
    if let Some(tag) = spec.tag.as_deref().filter(|t| !t.trim().is_empty()) {
        order["tag"] = json!(tag);
    }
    vec![
        ("type", "single".to_string()),
        ("condition", condition.to_string()),
        ("orders", json!([order]).to_string()),
    ]
}

#[derive(Debug, Clone)]
pub struct KiteClient {
    http: reqwest::Client,
    base_url: Url,
    authorization: String,
    retry: RetryConfig,
}

impl KiteClient {
    pub fn new(config: KiteClientConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() || config.access_token.trim().is_empty() {
            return Err(ProviderError::MissingCredentials("Kite"));
        }
        Ok(Self {
            http: http_client(config.timeout, None)?,
            base_url: parse_base_url(&config.base_url, SERVICE)?,
            authorization: format!("token {}:{}", config.api_key, config.access_token),
            retry: RetryConfig::default(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        endpoint(&self.base_url, segments, SERVICE)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("X-Kite-Version", API_VERSION)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
    }

    async fn send<F>(
        &self,
        build_request: F,
        retry: &RetryConfig,
    ) -> Result<reqwest::Response, ProviderError>
    where
        F: Fn() -> RequestBuilder,
    {
        match send_with_retry(|| self.authed(build_request()), retry).await {
            RetryOutcome::Success(response) => Ok(response),
            RetryOutcome::HttpError(response) => {
                let status = response.status();
                let body = read_capped_error_body(response).await;
                let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                    .map(|e| e.error_message())
                    .unwrap_or(body);
                tracing::warn!(service = SERVICE, status = %status, %message, "API request failed");
                Err(ProviderError::Api {
                    service: SERVICE,
                    status,
                    message,
                })
            }
            RetryOutcome::ConnectionError { attempts, source } => Err(ProviderError::Connection {
                service: SERVICE,
                attempts,
                source,
            }),
            RetryOutcome::NonRetryable(source) => Err(ProviderError::Connection {
                service: SERVICE,
                attempts: 1,
                source,
            }),
        }
    }

    async fn data<T, F>(&self, build_request: F, retry: &RetryConfig) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let response = self.send(build_request, retry).await?;
        let status = response.status();
        let body = response.text().await.map_err(|e| ProviderError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;
        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })?;
        if envelope.status != "success" {
            return Err(ProviderError::Api {
                service: SERVICE,
                status,
                message: envelope.error_message(),
            });
        }
        envelope.data.ok_or_else(|| ProviderError::Decode {
            service: SERVICE,
            message: "response has no data".into(),
        })
    }

    pub async fn profile(&self) -> Result<Profile, ProviderError> {
        let url = self.url(&["user", "profile"])?;
        self.data(|| self.http.get(url.clone()), &self.retry).await
    }

    pub async fn gtts(&self) -> Result<Vec<Gtt>, ProviderError> {
        let url = self.url(&["gtt", "triggers"])?;
        self.data(|| self.http.get(url.clone()), &self.retry).await
    }

    pub async fn holdings(&self) -> Result<Vec<Holding>, ProviderError> {
        let url = self.url(&["portfolio", "holdings"])?;
        self.data(|| self.http.get(url.clone()), &self.retry).await
    }

    pub async fn instruments(&self) -> Result<Vec<Instrument>, ProviderError> {
        let url = self.url(&["instruments"])?;
        let response = self.send(|| self.http.get(url.clone()), &self.retry).await?;
        let text = response.text().await.map_err(|e| ProviderError::Decode {
            service: SERVICE,
            message: e.to_string(),
        })?;
        let instruments = parse_instruments(&text)?;
        tracing::info!(count = instruments.len(), "loaded instruments");
        Ok(instruments)
    }

    /// Place a single-leg GTT. Never retried, so a timeout cannot double-place.
    pub async fn place_gtt(&self, spec: &GttOrderSpec) -> Result<String, ProviderError> {
        let url = self.url(&["gtt", "triggers"])?;
        let form = gtt_form(spec);
        tracing::debug!(
            exchange = %spec.exchange,
            symbol = %spec.symbol,
            trigger = spec.trigger_price,
            last_price = spec.last_price,
            "placing GTT"
        );
        let created: TriggerId = self
            .data(
                || self.http.post(url.clone()).form(&form),
                &RetryConfig::no_retry(),
            )
            .await?;
        Ok(created.trigger_id.to_string())
    }

    pub async fn modify_gtt(&self, gtt_id: &str, spec: &GttOrderSpec) -> Result<(), ProviderError> {
        let url = self.url(&["gtt", "triggers", gtt_id])?;
        let form = gtt_form(spec);
        tracing::debug!(gtt_id, symbol = %spec.symbol, "modifying GTT");
        let _: TriggerId = self
            .data(|| self.http.put(url.clone()).form(&form), &self.retry)
            .await?;
        Ok(())
    }

    pub async fn delete_gtt(&self, gtt_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&["gtt", "triggers", gtt_id])?;
        tracing::debug!(gtt_id, "deleting GTT");
        let _: TriggerId = self
            .data(|| self.http.delete(url.clone()), &self.retry)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::TransactionSide;

    fn spec() -> GttOrderSpec {
        GttOrderSpec {
            exchange: "NSE".into(),
            symbol: "TCS".into(),
            side: TransactionSide::Buy,
            quantity: 5,
            trigger_price: 3500.0,
            last_price: 3700.0,
            limit_price: 3500.05,
            tag: Some("SWING".into()),
        }
    }

    #[test]
    fn gtt_form_carries_json_condition_and_orders() {
        let form = gtt_form(&spec());
        assert_eq!(form[0], ("type", "single".to_string()));
        let condition: serde_json::Value = serde_json::from_str(&form[1].1).unwrap();
        assert_eq!(condition["trigger_values"], json!([3500.0]));
        assert_eq!(condition["last_price"], json!(3700.0));
        let orders: serde_json::Value = serde_json::from_str(&form[2].1).unwrap();
        assert_eq!(orders[0]["transaction_type"], "BUY");
        assert_eq!(orders[0]["order_type"], "LIMIT");
        assert_eq!(orders[0]["product"], "CNC");
        assert_eq!(orders[0]["price"], json!(3500.05));
        assert_eq!(orders[0]["tag"], "SWING");
    }

    #[test]
    fn blank_tag_is_omitted() {
        let mut spec = spec();
        spec.tag = Some("  ".into());
        let orders: serde_json::Value = serde_json::from_str(&gtt_form(&spec)[2].1).unwrap();
        assert!(orders[0].get("tag").is_none());
    }

    #[test]
    fn instruments_csv_parsing() {
        let csv = "instrument_token,exchange_token,tradingsymbol,name,last_price,expiry,strike,tick_size,lot_size,instrument_type,segment,exchange\n\
                   2953217,11536,TCS,TATA CONSULTANCY SERV LT,0,,0,0.1,1,EQ,NSE,NSE\n\
                   ,,,,,,,,,,,\n\
                   3045,11,SBIN,STATE BANK OF INDIA,0,,0,0.05,1,EQ,BSE,BSE\n";
        let instruments = parse_instruments(csv).unwrap();
        assert_eq!(instruments.len(), 2);
        assert_eq!(instruments[0].key(), "NSE:TCS");
        assert_eq!(instruments[0].tick_size, 0.1);
        assert_eq!(instruments[1].key(), "BSE:SBIN");
    }

    #[test]
    fn envelope_error_message_includes_type() {
        let env: Envelope<serde_json::Value> = serde_json::from_str(
            r#"{"status":"error","message":"Invalid trigger price","error_type":"InputException"}"#,
        )
        .unwrap();
        assert_eq!(env.error_message(), "InputException: Invalid trigger price");
    }
}
