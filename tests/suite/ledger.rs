//! Daily ledger flow: quotes into BANK_INC/BANK_NEW, then replication to BANK_FINAL

use std::time::Duration;

use tally_core::{EtlOptions, MemorySheets, TeleportOptions, replicate, run_bank_etl};
use tally_types::{Cell, RowKey};

use crate::common::{bank_header, row};

fn market_data() -> MemorySheets {
    let header = row(&[
        "Symbol",
        "Company_Name",
        "Current_Price",
        "Day_Low",
        "Day_High",
        "Volume (in Cr.)",
        "Last_Updated",
    ]);
    MemorySheets::new()
        .with_tab(
            "NSE_Stock_Data",
            vec![
                header.clone(),
                row(&["NSE:TCS", "Tata", "4000", "3950", "4050", "12.5", "16-Jul-2025"]),
                row(&["NSE:INFY", "Infosys", "1600", "0", "1610", "8.1", "16-Jul-2025"]),
            ],
        )
        .with_tab(
            "NSE_ETF_Data",
            vec![
                header,
                row(&["NSE:GOLDBEES", "Gold", "61.2", "60.9", "61.5", "0.4", "16-Jul-2025"]),
            ],
        )
}

fn bank_source() -> MemorySheets {
    MemorySheets::new()
        .with_tab(
            "TICKERS",
            vec![
                row(&["TICKER", "TYPE"]),
                row(&["NSE:TCS", "STOCK"]),
                row(&["NSE:INFY", "STOCK"]),
                row(&["NSE:GOLDBEES", "ETF"]),
            ],
        )
        .with_tab("BANK_INC", vec![bank_header()])
        .with_tab(
            "BANK_NEW",
            vec![
                bank_header(),
                row(&["2025-07-15", "NSE:INFY", "1590", "1575", "1599", "7.7", "STOCK"]),
            ],
        )
}

fn bank_dest() -> MemorySheets {
    let mut header = bank_header();
    header.extend([Cell::text("CHG"), Cell::text("PCT")]);
    let mut first = row(&["2025-07-15", "NSE:INFY", "1590", "1575", "1599", "7.7", "STOCK"]);
    first.extend([Cell::text("=C2-C1"), Cell::text("=H2/C2")]);
    MemorySheets::new().with_grid("BANK_FINAL", vec![header, first], 3)
}

#[tokio::test]
async fn quotes_flow_through_to_the_final_ledger() {
    let (market, source, dest) = (market_data(), bank_source(), bank_dest());

    let etl = run_bank_etl(
        &market,
        &source,
        &EtlOptions {
            post_checks: Vec::new(),
            ..EtlOptions::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(etl.inc_rows, 3);
    assert_eq!(etl.appends, 3);
    assert_eq!(etl.filled_values, 1);

    let new_rows = source.rows("BANK_NEW");
    assert_eq!(new_rows.len(), 5);
    // INFY's zero LOW is carried forward from the previous session.
    assert_eq!(new_rows[3][1], Cell::text("NSE:INFY"));
    assert_eq!(new_rows[3][3], Cell::text("1575"));

    let options = TeleportOptions {
        batch_sleep: Duration::ZERO,
        page_size: 2,
        ..TeleportOptions::default()
    };
    let report = replicate(&source, &dest, &options).await.unwrap();
    assert_eq!(report.keys_read, 3);
    assert_eq!(report.missing_keys, 0);
    assert_eq!(report.appends, 3);
    assert_eq!(report.verification_mismatches, 0);

    let final_rows = dest.rows("BANK_FINAL");
    assert_eq!(final_rows.len(), 5);
    let keys: Vec<RowKey> = final_rows[2..].iter().map(|r| RowKey::from_row(r)).collect();
    assert!(keys.contains(&RowKey::new("2025-07-16", "NSE:TCS")));
    assert!(keys.contains(&RowKey::new("2025-07-16", "NSE:GOLDBEES")));
    assert!(final_rows[2..].iter().all(|r| r[7] == Cell::text("=C2-C1")));
    assert!(dest.grid_rows("BANK_FINAL") >= 5);

    // A second run overwrites in place instead of appending again.
    let again = replicate(&source, &dest, &options).await.unwrap();
    assert_eq!(again.overwrites, 3);
    assert_eq!(again.appends, 0);
    assert_eq!(dest.rows("BANK_FINAL").len(), 5);
}
