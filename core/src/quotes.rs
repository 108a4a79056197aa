//! Market-data refresh: fetch a quote per NSE symbol, upload the table to a
//! tab, and keep CSV copies of the result and of the symbols that failed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt};
use tally_config::QuotesConfig;
use tally_providers::ProviderError;
use tally_types::market::{QUOTE_HEADER, QUOTE_NUMBER_COLUMNS};
use tally_types::{A1Range, Cell, NumberFormat, Quote, Row, RowSpan, ValueInput, nse_symbol};
use tally_utils::{CsvError, CsvTable, atomic_write, write_csv};
use thiserror::Error;

use crate::ports::{QuoteSource, SheetError, SheetStore};

const FETCH_ATTEMPTS: u32 = 3;
const UPLOAD_ATTEMPTS: u32 = 5;
const MIN_UPLOAD_BATCH: usize = 10;
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum QuotesError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse ticker file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: CsvError,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: CsvError,
    },
    #[error("ticker file must be .txt or .csv: {0}")]
    UnsupportedTickerFile(PathBuf),
    #[error("ETF runs need a ticker file")]
    MissingTickerFile,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error("upload of rows starting at {start_row} failed after {attempts} attempts: {source}")]
    Upload {
        start_row: u32,
        attempts: u32,
        #[source]
        source: SheetError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Stock,
    Etf,
}

impl Market {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Etf => "etf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotesOptions {
    pub tab: String,
    pub csv_path: PathBuf,
    pub failed_path: PathBuf,
    pub workers: usize,
    pub upload_batch: usize,
    /// First retry delay; doubles per attempt.
    pub backoff: Duration,
    /// Pause between upload batches.
    pub batch_pause: Duration,
}

impl QuotesOptions {
    #[must_use]
    pub fn from_config(config: &QuotesConfig, market: Market) -> Self {
        let (tab, csv_path) = match market {
            Market::Stock => (&config.stock_tab, &config.stock_csv),
            Market::Etf => (&config.etf_tab, &config.etf_csv),
        };
        Self {
            tab: tab.clone(),
            csv_path: csv_path.clone(),
            failed_path: config.failed_symbols_file.clone(),
            workers: config.workers.max(1),
            upload_batch: config.upload_batch.max(MIN_UPLOAD_BATCH),
            backoff: Duration::from_secs(1),
            batch_pause: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuotesReport {
    pub requested: usize,
    pub quotes: Vec<Quote>,
    pub failed: Vec<String>,
    pub upload_batches: usize,
    pub final_batch_size: usize,
}

/// Uppercased, `NSE:`-prefixed symbols in input order. Blanks are dropped.
pub fn normalize_symbols<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .map(|s| nse_symbol(&s))
        .collect()
}

/// Symbols from a `.txt` file (one per line) or a `.csv` file (`SYMBOL`, then
/// `TICKER`, then the first column).
pub fn read_ticker_file(path: &Path) -> Result<Vec<String>, QuotesError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let text = std::fs::read_to_string(path).map_err(|source| QuotesError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let symbols = match ext.as_deref() {
        Some("txt") => normalize_symbols(text.lines()),
        Some("csv") => {
            let table = CsvTable::parse(&text).map_err(|source| QuotesError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            let idx = table
                .column("SYMBOL")
                .or_else(|| table.column("TICKER"))
                .unwrap_or(0);
            normalize_symbols(table.column_values(idx))
        }
        _ => return Err(QuotesError::UnsupportedTickerFile(path.to_path_buf())),
    };
    tracing::info!(path = %path.display(), count = symbols.len(), "ticker file loaded");
    Ok(symbols)
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.min(16));
    let jitter = base.mul_f64(rand::random::<f64>());
    (exp + jitter).min(MAX_BACKOFF)
}

async fn fetch_one<Q: QuoteSource>(
    source: &Q,
    symbol: &str,
    backoff: Duration,
) -> Result<Quote, ProviderError> {
    let mut attempt = 0;
    loop {
        match source.quote(symbol).await {
            Ok(quote) => return Ok(quote),
            Err(err) if attempt + 1 < FETCH_ATTEMPTS => {
                let delay = backoff_delay(backoff, attempt);
                tracing::warn!(
                    symbol,
                    attempt = attempt + 1,
                    of = FETCH_ATTEMPTS,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "quote fetch failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fetch every symbol with at most `workers` requests in flight. Results keep
/// input order and are stamped with `today`.
pub async fn fetch_quotes<Q: QuoteSource>(
    source: &Q,
    symbols: &[String],
    workers: usize,
    backoff: Duration,
    today: NaiveDate,
) -> (Vec<Quote>, Vec<String>) {
    if symbols.is_empty() {
        tracing::warn!("no symbols to fetch");
        return (Vec::new(), Vec::new());
    }
    tracing::info!(count = symbols.len(), workers, "fetching quotes");
    let mut results: Vec<(usize, Result<Quote, ProviderError>)> = stream::iter(symbols.iter().enumerate())
        .map(|(idx, symbol)| async move { (idx, fetch_one(source, symbol, backoff).await) })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;
    results.sort_by_key(|(idx, _)| *idx);

    let mut quotes = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for (idx, result) in results {
        match result {
            Ok(mut quote) => {
                quote.last_updated = Some(today);
                quotes.push(quote);
            }
            Err(err) => {
                tracing::error!(symbol = %symbols[idx], error = %err, "quote fetch failed permanently");
                failed.push(symbols[idx].clone());
            }
        }
    }
    tracing::info!(fetched = quotes.len(), failed = failed.len(), "fetch complete");
    (quotes, failed)
}

/// Replace the tab with the quote table, shrinking batches on rate limits.
/// Returns `(batches, final_batch_size)`.
pub async fn upload_quotes<S: SheetStore>(
    store: &S,
    tab: &str,
    quotes: &[Quote],
    options: &QuotesOptions,
) -> Result<(usize, usize), QuotesError> {
    let mut data: Vec<Row> = Vec::with_capacity(quotes.len() + 1);
    data.push(QUOTE_HEADER.iter().map(|h| Cell::text(*h)).collect());
    data.extend(quotes.iter().map(Quote::to_row));
    let total = data.len();
    let width = QUOTE_HEADER.len() as u32;

    store.clear(tab, &[A1Range::whole()]).await?;
    let grid = store.row_count(tab).await?;
    if total as u32 > grid {
        store.add_rows(tab, total as u32 - grid).await?;
    }

    let mut batch_size = options.upload_batch.max(MIN_UPLOAD_BATCH);
    let mut batches = 0;
    let mut i = 0;
    while i < total {
        let mut attempt = 0;
        let written = loop {
            let end = (i + batch_size).min(total);
            let start_row = i as u32 + 1;
            let range = A1Range::rows(1, width, RowSpan::new(start_row, end as u32));
            match store
                .update(tab, &range, &data[i..end], ValueInput::UserEntered)
                .await
            {
                Ok(()) => break end - i,
                Err(err) => {
                    attempt += 1;
                    if attempt >= UPLOAD_ATTEMPTS {
                        return Err(QuotesError::Upload {
                            start_row,
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let delay = backoff_delay(options.backoff, attempt);
                    if err.is_rate_limited() {
                        batch_size = (batch_size / 2).max(MIN_UPLOAD_BATCH);
                        tracing::warn!(start_row, batch_size, delay_ms = delay.as_millis() as u64, error = %err, "rate limited; shrinking batch");
                    } else {
                        tracing::warn!(start_row, attempt, delay_ms = delay.as_millis() as u64, error = %err, "upload failed; retrying");
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        };
        i += written;
        batches += 1;
        if i < total {
            tokio::time::sleep(options.batch_pause).await;
        }
    }

    if quotes.is_empty() {
        return Ok((batches, batch_size));
    }
    let data_rows = RowSpan::new(2, total as u32);
    let decimal2 = NumberFormat::decimal2();
    let ledger_date = NumberFormat::ledger_date();
    for (idx, name) in QUOTE_HEADER.iter().enumerate() {
        let format = if QUOTE_NUMBER_COLUMNS.contains(name) {
            &decimal2
        } else if *name == "Last_Updated" {
            &ledger_date
        } else {
            continue;
        };
        let col = idx as u32 + 1;
        if let Err(err) = store
            .set_number_format(tab, &A1Range::rows(col, col, data_rows), format)
            .await
        {
            tracing::debug!(tab, column = name, error = %err, "could not set number format");
        }
    }
    tracing::info!(tab, rows = quotes.len(), batches, "quotes uploaded");
    Ok((batches, batch_size))
}

/// Write the quote CSV and the failed-symbol list (one per line, empty when none failed).
pub fn write_outputs(
    csv_path: &Path,
    failed_path: &Path,
    quotes: &[Quote],
    failed: &[String],
) -> Result<(), QuotesError> {
    let rows: Vec<Vec<String>> = quotes
        .iter()
        .map(|q| q.to_row().iter().map(Cell::as_text).collect())
        .collect();
    let encoded = write_csv(&QUOTE_HEADER, &rows).map_err(|source| QuotesError::Encode {
        path: csv_path.to_path_buf(),
        source,
    })?;
    atomic_write(csv_path, &encoded).map_err(|source| QuotesError::Write {
        path: csv_path.to_path_buf(),
        source,
    })?;
    let listing: String = failed.iter().map(|s| format!("{s}\n")).collect();
    atomic_write(failed_path, listing.as_bytes()).map_err(|source| QuotesError::Write {
        path: failed_path.to_path_buf(),
        source,
    })?;
    tracing::info!(csv = %csv_path.display(), failed = failed.len(), "quote files written");
    Ok(())
}

/// Fetch, upload, and save. A failed upload still leaves the CSV files written.
pub async fn run_quotes<Q: QuoteSource, S: SheetStore>(
    source: &Q,
    store: &S,
    symbols: &[String],
    options: &QuotesOptions,
    today: NaiveDate,
) -> Result<QuotesReport, QuotesError> {
    let (quotes, failed) =
        fetch_quotes(source, symbols, options.workers, options.backoff, today).await;
    write_outputs(&options.csv_path, &options.failed_path, &quotes, &failed)?;
    let (upload_batches, final_batch_size) =
        upload_quotes(store, &options.tab, &quotes, options).await?;
    Ok(QuotesReport {
        requested: symbols.len(),
        quotes,
        failed,
        upload_batches,
        final_batch_size,
    })
}
