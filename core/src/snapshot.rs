//! Broker state exports: every GTT, or every holding, written to a tab.

use tally_config::CellExpectation;
use tally_providers::kite::{Gtt, Holding};
use tally_types::{A1Range, Cell, Row, RowSpan, ValueInput};
use thiserror::Error;

use crate::checks::{CheckOutcome, expect_cells};
use crate::ports::{BrokerError, BrokerReader, SheetError, SheetStore};

pub const GTT_HEADER: [&str; 11] = [
    "GTT ID",
    "Symbol",
    "Exchange",
    "Trigger Type",
    "Trigger Value",
    "Order Price",
    "Order Qty",
    "Order Type",
    "Product",
    "Transaction Type",
    "Status",
];

pub const HOLDINGS_HEADER: [&str; 10] = [
    "Tradingsymbol",
    "ISIN",
    "Quantity",
    "Used Quantity",
    "T1 Quantity",
    "Average Price",
    "Last Price",
    "P&L",
    "Product",
    "Exchange",
];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotReport {
    pub rows: usize,
    pub checks: Vec<CheckOutcome>,
}

/// One row per GTT, describing its first order leg.
#[must_use]
pub fn gtt_row(gtt: &Gtt) -> Row {
    let order = gtt.orders.first();
    vec![
        Cell::from(gtt.id),
        Cell::text(gtt.condition.tradingsymbol.clone()),
        Cell::text(gtt.condition.exchange.clone()),
        Cell::text(gtt.kind.clone()),
        Cell::from_option(gtt.condition.trigger_values.first().copied()),
        Cell::from_option(order.map(|o| o.price)),
        order.map_or(Cell::Empty, |o| Cell::from(o.quantity)),
        order.map_or(Cell::Empty, |o| Cell::text(o.order_type.clone())),
        order.map_or(Cell::Empty, |o| Cell::text(o.product.clone())),
        order.map_or(Cell::Empty, |o| Cell::text(o.transaction_type.clone())),
        Cell::text(gtt.status.clone()),
    ]
}

#[must_use]
pub fn holding_row(holding: &Holding) -> Row {
    vec![
        Cell::text(holding.tradingsymbol.clone()),
        Cell::text(holding.isin.clone()),
        Cell::from(holding.quantity),
        Cell::from(holding.used_quantity),
        Cell::from(holding.t1_quantity),
        Cell::number(holding.average_price),
        Cell::number(holding.last_price),
        Cell::number(holding.pnl),
        Cell::text(holding.product.clone()),
        Cell::text(holding.exchange.clone()),
    ]
}

/// Replace the tab's contents with `header` and `rows` from `A1`.
pub async fn write_table<S: SheetStore>(
    store: &S,
    tab: &str,
    header: &[&str],
    rows: Vec<Row>,
) -> Result<(), SheetError> {
    let mut values = Vec::with_capacity(rows.len() + 1);
    values.push(header.iter().map(|h| Cell::text(*h)).collect::<Row>());
    values.extend(rows);
    let height = values.len() as u32;

    store.clear(tab, &[A1Range::whole()]).await?;
    let grid = store.row_count(tab).await?;
    if height > grid {
        store.add_rows(tab, height - grid).await?;
    }
    store
        .update(
            tab,
            &A1Range::rows(1, header.len() as u32, RowSpan::new(1, height)),
            &values,
            ValueInput::UserEntered,
        )
        .await
}

/// Export every GTT. An empty broker list leaves the tab untouched.
pub async fn export_gtts<S: SheetStore, B: BrokerReader>(
    store: &S,
    broker: &B,
    tab: &str,
) -> Result<SnapshotReport, SnapshotError> {
    let gtts = broker.gtts().await?;
    if gtts.is_empty() {
        tracing::info!("no GTTs found");
        return Ok(SnapshotReport::default());
    }
    let rows: Vec<Row> = gtts.iter().map(gtt_row).collect();
    let count = rows.len();
    write_table(store, tab, &GTT_HEADER, rows).await?;
    tracing::info!(tab, rows = count, "GTTs written");
    Ok(SnapshotReport {
        rows: count,
        checks: Vec::new(),
    })
}

/// Export every holding, then evaluate `checks` against the same spreadsheet.
pub async fn export_holdings<S: SheetStore, B: BrokerReader>(
    store: &S,
    broker: &B,
    tab: &str,
    checks: &[CellExpectation],
) -> Result<SnapshotReport, SnapshotError> {
    let holdings = broker.holdings().await?;
    tracing::info!(count = holdings.len(), "holdings fetched");
    let mut report = SnapshotReport::default();
    if holdings.is_empty() {
        tracing::warn!(tab, "no holdings to write");
    } else {
        let rows: Vec<Row> = holdings.iter().map(holding_row).collect();
        report.rows = rows.len();
        write_table(store, tab, &HOLDINGS_HEADER, rows).await?;
        tracing::info!(tab, rows = report.rows, "holdings written");
    }
    report.checks = expect_cells(store, checks).await;
    Ok(report)
}
