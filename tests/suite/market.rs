//! Quote refresh against a mocked Yahoo chart API

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use tally_core::quotes::{QuotesOptions, normalize_symbols, read_ticker_file};
use tally_core::{MemorySheets, run_quotes};
use tally_providers::yahoo::YahooClient;
use tally_types::Cell;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chart(price: f64, volume: f64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "chart": {"result": [{"meta": {
            "regularMarketPrice": price,
            "regularMarketDayHigh": price + 10.0,
            "regularMarketDayLow": price - 10.0,
            "regularMarketVolume": volume,
            "chartPreviousClose": price - 5.0,
            "fiftyTwoWeekHigh": price * 1.2,
            "fiftyTwoWeekLow": price * 0.8,
            "shortName": "Listed Co"
        }}], "error": null}
    }))
}

#[tokio::test]
async fn ticker_file_to_sheet_and_csv() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/TCS.NS"))
        .respond_with(chart(4000.0, 2_500_000.0))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/GOLDBEES.NS"))
        .respond_with(chart(60.0, 1_000_000.0))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/DELISTED.NS"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let tickers = dir.path().join("tickers.txt");
    std::fs::write(&tickers, "tcs\nDELISTED\n\nNSE:GOLDBEES\n").unwrap();
    let symbols = read_ticker_file(&tickers).unwrap();
    assert_eq!(symbols, vec!["NSE:TCS", "NSE:DELISTED", "NSE:GOLDBEES"]);

    let store = MemorySheets::new().with_grid("NSE_Stock_Data", vec![], 2);
    let options = QuotesOptions {
        tab: "NSE_Stock_Data".into(),
        csv_path: dir.path().join("stock.csv"),
        failed_path: dir.path().join("failed_symbols.csv"),
        workers: 2,
        upload_batch: 200,
        backoff: Duration::from_millis(1),
        batch_pause: Duration::ZERO,
    };
    let yahoo = YahooClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let today = NaiveDate::from_ymd_opt(2025, 7, 16).unwrap();

    let report = run_quotes(&yahoo, &store, &symbols, &options, today)
        .await
        .unwrap();

    assert_eq!(report.requested, 3);
    assert_eq!(report.failed, vec!["NSE:DELISTED".to_string()]);
    assert_eq!(report.upload_batches, 1);

    let rows = store.rows("NSE_Stock_Data");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0][8], Cell::text("Volume (in Cr.)"));
    assert_eq!(rows[1][0], Cell::text("NSE:TCS"));
    assert_eq!(rows[1][8], Cell::Number(1000.0));
    assert_eq!(rows[2][0], Cell::text("NSE:GOLDBEES"));
    assert_eq!(rows[2][9], Cell::text("16-Jul-2025"));
    assert!(store.grid_rows("NSE_Stock_Data") >= 3);

    let csv = std::fs::read_to_string(dir.path().join("stock.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("NSE:TCS,Listed Co,4000"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("failed_symbols.csv")).unwrap(),
        "NSE:DELISTED\n"
    );
}

#[test]
fn nse_listing_symbols_are_prefixed_once() {
    assert_eq!(
        normalize_symbols(["RELIANCE", " nse:hdfcbank ", "M&M"]),
        vec!["NSE:RELIANCE", "NSE:HDFCBANK", "NSE:M&M"]
    );
}
