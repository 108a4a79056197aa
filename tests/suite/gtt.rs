//! GTT instruction processing against a mocked Kite API

use serde_json::json;
use tally_core::{GttOptions, MemorySheets, process_instructions};
use tally_types::{Cell, Row, StatusMessage};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer};

use crate::common::{KITE_AUTH, kite, kite_error, kite_ok, row};

const INSTRUCTION_HEADER: [&str; 9] = [
    "TICKER", "TYPE", "UNITS", "GTT PRICE", "LIVE PRICE", "TICK SIZE", "ACTION", "METHOD",
    "GTT DATE",
];

fn sheets(instructions: Vec<Row>, data: Vec<Row>) -> MemorySheets {
    let mut instruction_rows = vec![row(&INSTRUCTION_HEADER)];
    instruction_rows.extend(instructions);
    let mut data_rows = vec![row(&["TICKER", "TYPE", "UNITS", "GTT PRICE", "GTT DATE", "GTT ID"])];
    data_rows.extend(data);
    MemorySheets::new()
        .with_tab("GTT_INSTRUCTIONS", instruction_rows)
        .with_tab("GTT_DATA", data_rows)
}

fn options() -> GttOptions {
    GttOptions {
        batch_size: 10,
        ..GttOptions::default()
    }
}

#[tokio::test]
async fn place_and_delete_keep_data_tab_in_step() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gtt/triggers"))
        .and(header("authorization", KITE_AUTH))
        .and(header("x-kite-version", "3"))
        .and(body_string_contains("TCS"))
        .respond_with(kite_ok(json!({ "trigger_id": 777 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/gtt/triggers/555"))
        .respond_with(kite_ok(json!({ "trigger_id": 555 })))
        .expect(1)
        .mount(&server)
        .await;

    let store = sheets(
        vec![
            row(&["NSE:TCS", "ST BUY", "10", "3500", "3600", "0.05", "PLACE", "SWING", "16-Jul-2025"]),
            row(&["NSE:INFY", "LT SELL", "5", "1500", "", "", "DELETE", "", ""]),
            row(&["NSE:TCS", "RTP_BUY", "10", "3500", "3600", "0.05", "PLACE", "", ""]),
        ],
        vec![row(&["NSE:INFY", "LT SELL", "5", "1500", "01-Jul-2025", "555"])],
    );
    let broker = kite(&server);

    let result = process_instructions(&store, &store, &broker, &options())
        .await
        .unwrap();

    assert_eq!(result.total_processed, 3);
    assert_eq!(result.count(&StatusMessage::Placed), 1);
    assert_eq!(result.count(&StatusMessage::Deleted), 1);
    assert_eq!(result.count(&StatusMessage::DuplicateFound), 1);
    assert!(result.failed_rows.is_empty());

    let data = store.rows("GTT_DATA");
    assert_eq!(data.len(), 2);
    assert_eq!(data[1][0], Cell::text("NSE:TCS"));
    assert_eq!(data[1][5], Cell::text("777"));

    assert_eq!(store.cell("GTT_INSTRUCTIONS", "J1"), Cell::text("STATUS"));
    assert_eq!(store.cell("GTT_INSTRUCTIONS", "J2"), Cell::text("✅ placed"));
    assert_eq!(store.cell("GTT_INSTRUCTIONS", "J3"), Cell::text("✅ deleted"));
}

#[tokio::test]
async fn broker_rejection_is_reported_on_the_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gtt/triggers"))
        .respond_with(kite_error(400, "InputException", "Invalid trigger price"))
        .expect(1)
        .mount(&server)
        .await;

    let store = sheets(
        vec![row(&["NSE:SBIN", "ST BUY", "3", "800", "820", "0.05", "PLACE", "", ""])],
        vec![],
    );
    let result = process_instructions(&store, &store, &kite(&server), &options())
        .await
        .unwrap();

    assert_eq!(result.failed_rows.len(), 1);
    assert_eq!(result.failed_rows[0].row_number, 2);
    assert!(matches!(
        &result.statuses[0].1,
        StatusMessage::Error(msg) if msg.contains("Invalid trigger price")
    ));
    let status = store.cell("GTT_INSTRUCTIONS", "J2").as_text();
    assert!(status.starts_with("❌ error:"), "{status}");
    assert_eq!(store.rows("GTT_DATA").len(), 1);
}

#[tokio::test]
async fn modify_rewrites_the_matched_row() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/gtt/triggers/321"))
        .and(body_string_contains("1450"))
        .respond_with(kite_ok(json!({ "trigger_id": 321 })))
        .expect(1)
        .mount(&server)
        .await;

    let store = sheets(
        vec![row(&["NSE:INFY", "LT SELL", "8", "1450", "1500", "0.05", "update", "", "17-Jul-2025"])],
        vec![
            row(&["NSE:TCS", "ST BUY", "10", "3500", "", "111"]),
            row(&["NSE:INFY", "RTP_SELL", "5", "1500", "", "321"]),
        ],
    );
    let result = process_instructions(&store, &store, &kite(&server), &options())
        .await
        .unwrap();

    assert_eq!(result.count(&StatusMessage::Updated), 1);
    let data = store.rows("GTT_DATA");
    assert_eq!(data[2][1], Cell::text("LT SELL"));
    assert_eq!(data[2][2], Cell::Number(8.0));
    assert_eq!(data[2][3], Cell::Number(1450.0));
    assert_eq!(data[2][5], Cell::text("321"));
    assert_eq!(data[1][5], Cell::text("111"));
}
