//! Daily quote tabs -> BANK_INC and BANK_NEW.
//!
//! Today's stock and ETF quotes become the BANK_INC increment (date and type as
//! formulas) and are upserted into BANK_NEW as plain values, with zero or blank
//! market values carried forward from the symbol's most recent earlier row.

use std::collections::HashMap;

use chrono::NaiveDate;
use tally_config::{BankEtlConfig, CellExpectation};
use tally_types::key::date_formula;
use tally_types::{
    A1Range, BANK_HEADER, BANK_WIDTH, Cell, NumberFormat, Row, RowKey, RowSpan, VALUE_COLUMNS,
    ValueInput, ValueRender, cell_text, contiguous_runs, fit_row, nse_symbol, parse_date, zeroish,
};
use thiserror::Error;

use crate::checks::{CheckOutcome, expect_cells};
use crate::ports::{SheetError, SheetStore};
use crate::records::Records;

/// Quote tab column for each bank column it feeds, in bank order after SYMBOL.
const QUOTE_COLUMNS: [(&str, &str); 6] = [
    ("Symbol", "SYMBOL"),
    ("Current_Price", "CLOSE"),
    ("Day_Low", "LOW"),
    ("Day_High", "HIGH"),
    ("Volume (in Cr.)", "VOLUME"),
    ("Last_Updated", "DATE"),
];

#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error("tab '{tab}' has no '{column}' column")]
    MissingColumn { tab: String, column: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EtlOptions {
    pub stock_tab: String,
    pub etf_tab: String,
    pub inc_tab: String,
    pub new_tab: String,
    pub tickers_tab: String,
    /// Expectations against the destination spreadsheet.
    pub post_checks: Vec<CellExpectation>,
}

impl From<&BankEtlConfig> for EtlOptions {
    fn from(config: &BankEtlConfig) -> Self {
        Self {
            stock_tab: config.stock_tab.clone(),
            etf_tab: config.etf_tab.clone(),
            inc_tab: config.inc_tab.clone(),
            new_tab: config.new_tab.clone(),
            tickers_tab: config.tickers_tab.clone(),
            post_checks: config
                .post_checks
                .iter()
                .filter(|c| c.spreadsheet.is_none())
                .cloned()
                .collect(),
        }
    }
}

impl Default for EtlOptions {
    fn default() -> Self {
        Self::from(&BankEtlConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EtlReport {
    pub tickers: usize,
    pub inc_rows: usize,
    pub zero_values: usize,
    pub filled_values: usize,
    pub overwrites: usize,
    pub appends: usize,
    pub formatted: bool,
    pub checks: Vec<CheckOutcome>,
}

impl EtlReport {
    #[must_use]
    pub fn checks_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// A quote normalized into bank columns.
#[derive(Debug, Clone, PartialEq)]
struct Increment {
    date: Option<NaiveDate>,
    symbol: String,
    values: [Cell; 4],
}

impl Increment {
    fn inc_row(&self, sheet_row: usize) -> Row {
        let mut row = Vec::with_capacity(BANK_HEADER.len());
        row.push(self.date.map_or(Cell::Empty, |d| Cell::text(date_formula(d))));
        row.push(Cell::text(self.symbol.clone()));
        row.extend(self.values.iter().cloned());
        row.push(Cell::text(format!(
            "=IFERROR(VLOOKUP(B{sheet_row},TICKERS!A:C,3,FALSE))"
        )));
        row
    }

    fn date_text(&self) -> String {
        self.date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

async fn ticker_types<S: SheetStore>(
    store: &S,
    tab: &str,
) -> Result<HashMap<String, String>, EtlError> {
    let records = Records::load(store, tab, ValueRender::Formatted).await?;
    let mut map = HashMap::new();
    for (_, row) in records.iter() {
        let ticker = records.text(row, "TICKER");
        let kind = records.text(row, "TYPE");
        if !ticker.is_empty() && !kind.is_empty() {
            map.insert(nse_symbol(&ticker), kind);
        }
    }
    Ok(map)
}

async fn load_quotes<S: SheetStore>(store: &S, tab: &str) -> Result<Vec<Increment>, EtlError> {
    let records = Records::load(store, tab, ValueRender::Formatted).await?;
    let mut columns = [0usize; 6];
    for (slot, (name, _)) in columns.iter_mut().zip(QUOTE_COLUMNS) {
        *slot = records.column(name).ok_or_else(|| EtlError::MissingColumn {
            tab: tab.to_string(),
            column: name.to_string(),
        })?;
    }
    let [symbol_col, close, low, high, volume, date_col] = columns;

    let mut out = Vec::with_capacity(records.len());
    for (_, row) in records.iter() {
        let symbol = cell_text(row, symbol_col);
        if symbol.is_empty() {
            continue;
        }
        let number = |idx: usize| Cell::from_option(row.get(idx).and_then(Cell::as_f64));
        out.push(Increment {
            date: parse_date(&cell_text(row, date_col)),
            symbol: nse_symbol(&symbol),
            values: [number(close), number(low), number(high), number(volume)],
        });
    }
    tracing::debug!(tab, rows = out.len(), "quotes loaded");
    Ok(out)
}

/// Dated value rows of one symbol, oldest first.
type History = Vec<(NaiveDate, Row)>;

struct NewIndex {
    rows_by_key: HashMap<RowKey, u32>,
    history: HashMap<String, History>,
}

impl NewIndex {
    fn build(rows: Vec<Row>) -> Self {
        let mut rows_by_key = HashMap::new();
        let mut history: HashMap<String, History> = HashMap::new();
        for (i, row) in rows.into_iter().enumerate().skip(1) {
            let row = fit_row(row, BANK_HEADER.len());
            let key = RowKey::from_row(&row);
            rows_by_key.insert(key.clone(), i as u32 + 1);
            if let Some(date) = parse_date(&key.date) {
                history.entry(key.symbol).or_default().push((date, row));
            }
        }
        for rows in history.values_mut() {
            rows.sort_by_key(|(date, _)| *date);
        }
        Self {
            rows_by_key,
            history,
        }
    }

    /// Latest non-zero value of `idx` for `symbol` dated strictly before `before`.
    fn last_nonzero(&self, symbol: &str, idx: usize, before: NaiveDate) -> Option<(&Cell, NaiveDate)> {
        self.history
            .get(symbol)?
            .iter()
            .rev()
            .filter(|(date, _)| *date < before)
            .find_map(|(date, row)| row.get(idx).filter(|c| !zeroish(c)).map(|c| (c, *date)))
    }
}

/// Write the increment to BANK_INC below its header.
async fn write_inc<S: SheetStore>(
    store: &S,
    tab: &str,
    increments: &[Increment],
) -> Result<(), SheetError> {
    let header = store
        .get(tab, &A1Range::rows(1, BANK_WIDTH, RowSpan::single(1)), ValueRender::Formatted)
        .await?;
    if header.is_empty() {
        let header_row: Row = BANK_HEADER.iter().map(|h| Cell::text(*h)).collect();
        store
            .update(
                tab,
                &A1Range::rows(1, BANK_WIDTH, RowSpan::single(1)),
                &[header_row],
                ValueInput::Raw,
            )
            .await?;
    }
    store
        .clear(tab, &[A1Range::open(1, BANK_WIDTH, 2)])
        .await?;
    let rows: Vec<Row> = increments
        .iter()
        .enumerate()
        .map(|(i, inc)| inc.inc_row(i + 2))
        .collect();
    store.append(tab, &rows, ValueInput::UserEntered).await?;
    Ok(())
}

pub async fn run_bank_etl<S: SheetStore, D: SheetStore>(
    source: &S,
    dest: &D,
    options: &EtlOptions,
) -> Result<EtlReport, EtlError> {
    let mut report = EtlReport::default();

    let types = ticker_types(dest, &options.tickers_tab).await?;
    report.tickers = types.len();

    let mut increments = load_quotes(source, &options.stock_tab).await?;
    increments.extend(load_quotes(source, &options.etf_tab).await?);
    report.inc_rows = increments.len();

    for inc in &increments {
        for (field, value) in VALUE_COLUMNS.iter().zip(&inc.values) {
            if zeroish(value) {
                report.zero_values += 1;
                tracing::warn!(
                    symbol = %inc.symbol,
                    date = %inc.date_text(),
                    field = field.name(),
                    "zero or blank value in increment"
                );
            }
        }
    }

    write_inc(dest, &options.inc_tab, &increments).await?;
    tracing::info!(tab = %options.inc_tab, rows = increments.len(), "increment written");

    let existing = dest
        .get(&options.new_tab, &A1Range::whole(), ValueRender::Formatted)
        .await?;
    let index = NewIndex::build(existing);

    let mut overwrites: Vec<(u32, Row)> = Vec::new();
    let mut appends: Vec<Row> = Vec::new();
    for inc in &increments {
        let mut values = inc.values.clone();
        if let Some(date) = inc.date {
            for (field, value) in VALUE_COLUMNS.iter().zip(values.iter_mut()) {
                if !zeroish(value) {
                    continue;
                }
                if let Some((prev, prev_date)) = index.last_nonzero(&inc.symbol, field.index(), date) {
                    tracing::info!(
                        symbol = %inc.symbol,
                        %date,
                        field = field.name(),
                        value = %prev,
                        from = %prev_date,
                        "carried forward"
                    );
                    *value = prev.clone();
                    report.filled_values += 1;
                }
            }
        }

        let date_text = inc.date_text();
        let mut row: Row = vec![Cell::text(date_text.clone()), Cell::text(inc.symbol.clone())];
        row.extend(values);
        row.push(Cell::text(types.get(&inc.symbol).cloned().unwrap_or_default()));

        match index.rows_by_key.get(&RowKey::new(&date_text, &inc.symbol)) {
            Some(sheet_row) => overwrites.push((*sheet_row, row)),
            None => appends.push(row),
        }
    }
    report.overwrites = overwrites.len();
    report.appends = appends.len();

    for (start, rows) in contiguous_runs(overwrites) {
        let span = RowSpan::new(start, start + rows.len() as u32 - 1);
        dest.update(
            &options.new_tab,
            &A1Range::rows(1, BANK_WIDTH, span),
            &rows,
            ValueInput::UserEntered,
        )
        .await?;
    }
    if !appends.is_empty() {
        dest.append(&options.new_tab, &appends, ValueInput::UserEntered)
            .await?;
    }
    tracing::info!(
        tab = %options.new_tab,
        overwrites = report.overwrites,
        appends = report.appends,
        filled = report.filled_values,
        "ledger upserted"
    );

    match dest
        .set_number_format(
            &options.new_tab,
            &A1Range::open(1, 1, 2),
            &NumberFormat::ledger_date(),
        )
        .await
    {
        Ok(()) => report.formatted = true,
        Err(err) => tracing::warn!(tab = %options.new_tab, error = %err, "could not format date column"),
    }

    report.checks = expect_cells(dest, &options.post_checks).await;
    Ok(report)
}
