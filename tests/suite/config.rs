//! Configuration wiring into job options

use std::path::PathBuf;
use std::time::Duration;

use tally_config::TallyConfig;
use tally_core::checks::Rule;
use tally_core::quotes::{Market, QuotesOptions};
use tally_core::{EtlOptions, GttOptions, TeleportOptions};

const CONFIG: &str = r#"
[google]
access_token = "${TALLY_TEST_SHEETS_TOKEN}"
max_requests_per_minute = 30

[spreadsheets]
bank_source = "https://docs.google.com/spreadsheets/d/src-123/edit#gid=0"
bank_dest = "dest-456"

[teleport]
page_size = 5000
batch_sleep_ms = 0

[bank_etl]
post_checks = [
    { tab = "BANK_NEW", cell = "H1", equals = "0" },
    { spreadsheet = "bank_dest", tab = "BANK_FINAL", cell = "H1", equals = "0" },
]

[gtt]
batch_size = 250

[quotes]
etf_ticker_file = "lists/etf.txt"
workers = 4
upload_batch = 5

[[checks]]
name = "algo"
spreadsheet = "algo"
tab = "ALGO"
cell = "H1"

[[checks]]
spreadsheet = "algo"
tab = "ALGO"
cell = "K1"
equals = "DONE"
"#;

#[test]
fn sections_flow_into_job_options() {
    unsafe {
        std::env::set_var("TALLY_TEST_SHEETS_TOKEN", "from-env");
    }
    let config = TallyConfig::parse(CONFIG).unwrap();

    assert_eq!(config.google.access_token.as_deref(), Some("from-env"));
    assert!(!format!("{:?}", config.google).contains("from-env"));
    assert_eq!(config.spreadsheet("bank_source").as_str(), "src-123");
    assert_eq!(config.spreadsheet("dest-456").as_str(), "dest-456");

    let teleport = TeleportOptions::from(&config.teleport);
    assert_eq!(teleport.page_size, 5000);
    assert_eq!(teleport.batch_sleep, Duration::ZERO);
    assert_eq!(teleport.final_tab, "BANK_FINAL");

    let etl = EtlOptions::from(&config.bank_etl);
    assert_eq!(etl.post_checks.len(), 1);
    assert_eq!(etl.post_checks[0].tab, "BANK_NEW");

    let gtt = GttOptions::from(&config.gtt);
    assert_eq!(gtt.batch_size, 250);
    assert_eq!(gtt.start_row, 2);

    let etf = QuotesOptions::from_config(&config.quotes, Market::Etf);
    assert_eq!(etf.tab, "NSE_ETF_Data");
    assert_eq!(etf.workers, 4);
    assert_eq!(etf.upload_batch, 10);
    assert_eq!(
        config.quotes.etf_ticker_file,
        Some(PathBuf::from("lists/etf.txt"))
    );

    assert_eq!(Rule::from_config(&config.checks[0]), Rule::GreaterThan(0.995));
    assert_eq!(
        Rule::from_config(&config.checks[1]),
        Rule::Equals("DONE".into())
    );
    assert_eq!(config.flag.cell, "R1");
}

#[test]
fn empty_file_is_all_defaults() {
    let config = TallyConfig::parse("").unwrap();
    assert!(config.checks.is_empty());
    assert_eq!(config.bank_etl.post_checks.len(), 3);
    assert_eq!(config.snapshots.holdings_tab, "ZERODHA_PORTFOLIO");
    assert_eq!(config.quotes.workers, 10);
}
