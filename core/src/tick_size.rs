//! Tick sizes for the tickers listed in a tab.
//!
//! Column A holds `EXCHANGE:SYMBOL` tickers. Columns I and J hold an alternate
//! mapping for tickers the broker lists under another name. Results land in C
//! (tick size of the ticker itself), D (alternate used), and E (tick size of the
//! alternate).

use std::collections::HashMap;

use tally_types::{A1Range, Cell, NumberFormat, Row, RowSpan, ValueInput, ValueRender, cell_text};
use thiserror::Error;

use crate::ports::{BrokerError, BrokerReader, SheetError, SheetStore};

#[derive(Debug, Error)]
pub enum TickSizeError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error("instrument download failed: {0}")]
    Broker(#[from] BrokerError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSizeReport {
    pub rows: usize,
    pub resolved: usize,
    pub via_alternate: usize,
    pub unresolved: Vec<String>,
}

enum Resolution {
    Direct(f64),
    Alternate(String, Option<f64>),
    Missing,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// First non-blank alternate per ticker, in sheet order. Row 1 is the header.
fn alternates(rows: &[Row]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for row in rows {
        let key = cell_text(row, 0);
        if !key.is_empty() {
            map.entry(key).or_insert_with(|| cell_text(row, 1));
        }
    }
    map
}

fn resolve(ticker: &str, sizes: &HashMap<String, f64>, alternates: &HashMap<String, String>) -> Resolution {
    if let Some(size) = sizes.get(ticker) {
        return Resolution::Direct(*size);
    }
    match alternates.get(ticker).filter(|alt| !alt.is_empty()) {
        Some(alt) => Resolution::Alternate(alt.clone(), sizes.get(alt).copied()),
        None => Resolution::Missing,
    }
}

pub async fn refresh_tick_sizes<S: SheetStore, B: BrokerReader>(
    store: &S,
    broker: &B,
    tab: &str,
) -> Result<TickSizeReport, TickSizeError> {
    let instruments = broker.instruments().await?;
    let sizes: HashMap<String, f64> = instruments
        .iter()
        .map(|i| (i.key(), i.tick_size))
        .collect();
    tracing::info!(instruments = sizes.len(), "instrument tick sizes loaded");

    let tickers = store
        .get(tab, &A1Range::open(1, 1, 1), ValueRender::Formatted)
        .await?;
    let last_row = tickers.len() as u32;
    if last_row <= 1 {
        tracing::info!(tab, "no tickers to resolve");
        return Ok(TickSizeReport::default());
    }
    let data_rows = RowSpan::new(2, last_row);
    store
        .clear(tab, &[A1Range::rows(3, 5, data_rows)])
        .await?;

    let mapping = store
        .get(tab, &A1Range::open(9, 10, 2), ValueRender::Formatted)
        .await?;
    let alternates = alternates(&mapping);

    let mut report = TickSizeReport {
        rows: (last_row - 1) as usize,
        ..TickSizeReport::default()
    };
    let mut updates: Vec<Row> = Vec::with_capacity(report.rows);
    for (offset, row) in tickers.iter().skip(1).enumerate() {
        let ticker = cell_text(row, 0);
        if ticker.is_empty() {
            updates.push(vec![Cell::Empty; 3]);
            continue;
        }
        let cells = match resolve(&ticker, &sizes, &alternates) {
            Resolution::Direct(size) => {
                report.resolved += 1;
                vec![Cell::number(round2(size)), Cell::Empty, Cell::Empty]
            }
            Resolution::Alternate(alt, Some(size)) => {
                report.via_alternate += 1;
                tracing::debug!(row = offset + 2, ticker = %ticker, alternate = %alt, size, "resolved via alternate");
                vec![Cell::Empty, Cell::text(alt), Cell::number(round2(size))]
            }
            Resolution::Alternate(alt, None) => {
                tracing::warn!(row = offset + 2, ticker = %ticker, alternate = %alt, "alternate not listed by broker");
                report.unresolved.push(ticker);
                vec![Cell::Empty, Cell::text(alt), Cell::Empty]
            }
            Resolution::Missing => {
                tracing::warn!(row = offset + 2, ticker = %ticker, "ticker not listed and no alternate");
                report.unresolved.push(ticker);
                vec![Cell::Empty; 3]
            }
        };
        updates.push(cells);
    }

    store
        .update(tab, &A1Range::rows(3, 5, data_rows), &updates, ValueInput::UserEntered)
        .await?;
    let decimal2 = NumberFormat::decimal2();
    store
        .set_number_format(tab, &A1Range::rows(3, 3, data_rows), &decimal2)
        .await?;
    store
        .set_number_format(tab, &A1Range::rows(5, 5, data_rows), &decimal2)
        .await?;

    tracing::info!(
        tab,
        rows = report.rows,
        resolved = report.resolved,
        via_alternate = report.via_alternate,
        unresolved = report.unresolved.len(),
        "tick sizes written"
    );
    Ok(report)
}
