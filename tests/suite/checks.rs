//! Cell checks and flags against a mocked Google Sheets API

use chrono::NaiveDate;
use serde_json::json;
use tally_core::checks::{DateRoll, RollStep, Rule, check_cell, read_flag, roll_date, set_flag};
use tally_core::{MemorySheets, export_holdings};
use tally_config::CellExpectation;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{KITE_AUTH, kite, kite_ok, row, spreadsheet};

fn values(rows: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "values": rows }))
}

#[tokio::test]
async fn threshold_check_reads_formatted_cell() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/algo-id/values/'ALGO'!H1"))
        .and(query_param("valueRenderOption", "FORMATTED_VALUE"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(values(json!([["0.998"]])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/algo-id/values/'ALGO'!H2"))
        .respond_with(values(json!([["#N/A"]])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/algo-id/values/'ALGO'!H3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "range": "'ALGO'!H3" })))
        .mount(&server)
        .await;

    let sheet = spreadsheet(&server, "algo-id");
    let rule = Rule::GreaterThan(0.995);

    let ok = check_cell(&sheet, "algo", "ALGO", "H1", &rule).await;
    assert!(ok.passed, "{ok:?}");
    assert_eq!(ok.value, "0.998");

    let bad = check_cell(&sheet, "algo", "ALGO", "H2", &rule).await;
    assert!(!bad.passed);

    let blank = check_cell(&sheet, "algo", "ALGO", "H3", &rule).await;
    assert!(!blank.passed);
    assert!(blank.detail.contains("zero or blank"), "{}", blank.detail);
}

#[tokio::test]
async fn flag_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v4/spreadsheets/gtt-id/values/'ALL_OLD_GTTs'!R1"))
        .and(query_param("valueInputOption", "USER_ENTERED"))
        .and(body_partial_json(json!({ "values": [[true]] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/gtt-id/values/'ALL_OLD_GTTs'!R1"))
        .respond_with(values(json!([["TRUE"]])))
        .mount(&server)
        .await;

    let sheet = spreadsheet(&server, "https://docs.google.com/spreadsheets/d/gtt-id/edit#gid=0");
    set_flag(&sheet, "ALL_OLD_GTTs", "R1", true).await.unwrap();
    assert!(read_flag(&sheet, "ALL_OLD_GTTs", "R1").await);
    assert!(!read_flag(&sheet, "MISSING", "R1").await);
}

#[tokio::test]
async fn date_roll_copies_due_dates_and_records_change() {
    let store = MemorySheets::new().with_tab(
        "DATES",
        vec![row(&["15-Jul-2025", "14-Jul-2025"])],
    );
    let flags = MemorySheets::new().with_tab("ALL_OLD_GTTs", vec![]);
    let spec = DateRoll {
        source_tab: "DATES".into(),
        source_cell: "A1".into(),
        dest_tab: "DATES".into(),
        dest_cell: "B1".into(),
    };
    let today = NaiveDate::from_ymd_opt(2025, 7, 16).unwrap();

    let outcome = roll_date(&store, &spec, &flags, "ALL_OLD_GTTs", "R1", today)
        .await
        .unwrap();
    assert_eq!(outcome.step, RollStep::Copied("15-Jul-2025".into()));
    assert!(outcome.changed);
    assert!(read_flag(&flags, "ALL_OLD_GTTs", "R1").await);

    let again = roll_date(&store, &spec, &flags, "ALL_OLD_GTTs", "R1", today)
        .await
        .unwrap();
    assert!(!again.changed);
    assert!(!read_flag(&flags, "ALL_OLD_GTTs", "R1").await);
}

#[tokio::test]
async fn holdings_export_runs_completion_checks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/portfolio/holdings"))
        .and(header("authorization", KITE_AUTH))
        .respond_with(kite_ok(json!([{
            "tradingsymbol": "INFY",
            "exchange": "NSE",
            "isin": "INE009A01021",
            "quantity": 4,
            "used_quantity": 0,
            "t1_quantity": 1,
            "average_price": 1450.5,
            "last_price": 1500.0,
            "pnl": 198.0,
            "product": "CNC"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySheets::new().with_tab("ZERODHA_PORTFOLIO", vec![row(&["old"])]);
    let checks = vec![CellExpectation {
        spreadsheet: None,
        tab: "ZERODHA_PORTFOLIO".into(),
        cell: "A2".into(),
        equals: "INFY".into(),
    }];
    let report = export_holdings(&store, &kite(&server), "ZERODHA_PORTFOLIO", &checks)
        .await
        .unwrap();

    assert_eq!(report.rows, 1);
    assert!(report.checks[0].passed, "{:?}", report.checks);
    assert_eq!(store.cell("ZERODHA_PORTFOLIO", "A1").as_text(), "Tradingsymbol");
    assert_eq!(store.cell("ZERODHA_PORTFOLIO", "E2").as_text(), "1");
}
