//! Shared test utilities and fixtures
//!
//! Clients pointed at wiremock servers, plus row builders for in-memory sheets.

#![allow(dead_code)]

use std::time::Duration;

use serde_json::{Value, json};
use tally_providers::kite::{KiteClient, KiteClientConfig};
use tally_providers::retry::RetryConfig;
use tally_providers::sheets::{SheetsClient, SheetsClientConfig, Spreadsheet};
use tally_types::{BANK_HEADER, Cell, Row, SpreadsheetId};
use wiremock::{MockServer, ResponseTemplate};

pub const KITE_AUTH: &str = "token test-key:test-token";

pub fn row(values: &[&str]) -> Row {
    values.iter().map(|v| Cell::text(*v)).collect()
}

pub fn bank_header() -> Row {
    BANK_HEADER.iter().map(|h| Cell::text(*h)).collect()
}

/// Kite client with retries disabled so failures surface immediately.
pub fn kite(server: &MockServer) -> KiteClient {
    KiteClient::new(KiteClientConfig {
        base_url: server.uri(),
        api_key: "test-key".into(),
        access_token: "test-token".into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

/// Kite's `{"status": "success", "data": ...}` envelope.
pub fn kite_ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": "success", "data": data }))
}

pub fn kite_error(status: u16, error_type: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "status": "error",
        "error_type": error_type,
        "message": message,
    }))
}

pub fn spreadsheet(server: &MockServer, id: &str) -> Spreadsheet {
    SheetsClient::new(SheetsClientConfig {
        base_url: server.uri(),
        access_token: "test-token".into(),
        max_requests_per_minute: 0,
        retry: RetryConfig::no_retry(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
    .spreadsheet(SpreadsheetId::parse(id))
}
