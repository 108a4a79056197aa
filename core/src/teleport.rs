//! BANK_NEW -> BANK_FINAL replication keyed by `(date, symbol)`.
//!
//! The INC tab names which keys changed. Each key's canonical row in the source
//! NEW tab is upserted into the destination FINAL tab: existing keys are
//! overwritten at their lowest row, duplicates below it are deleted, and new
//! keys are appended. Writes are batched by contiguous row runs.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tally_config::TeleportConfig;
use tally_types::{
    A1Range, BANK_WIDTH, Row, RowKey, RowSpan, ValueInput, ValueRender, contiguous_runs,
    fit_row, group_contiguous, is_header_like, merge_spans, rows_equal,
};

use crate::ports::{SheetError, SheetStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeleportOptions {
    pub inc_tab: String,
    pub new_tab: String,
    pub final_tab: String,
    pub page_size: u32,
    pub batch_update_size: usize,
    pub append_chunk: usize,
    pub row_buffer: u32,
    pub batch_sleep: Duration,
    pub sample_size: usize,
}

impl From<&TeleportConfig> for TeleportOptions {
    fn from(config: &TeleportConfig) -> Self {
        Self {
            inc_tab: config.inc_tab.clone(),
            new_tab: config.new_tab.clone(),
            final_tab: config.final_tab.clone(),
            page_size: config.page_size.max(1),
            batch_update_size: config.batch_update_size.max(1),
            append_chunk: config.append_chunk.max(1),
            row_buffer: config.row_buffer,
            batch_sleep: Duration::from_millis(config.batch_sleep_ms),
            sample_size: config.sample_size,
        }
    }
}

impl Default for TeleportOptions {
    fn default() -> Self {
        Self::from(&TeleportConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeleportReport {
    pub keys_read: usize,
    pub missing_keys: usize,
    pub overwrites: usize,
    pub appends: usize,
    pub duplicates_deleted: usize,
    pub formula_rows_filled: usize,
    pub verified: usize,
    pub verification_mismatches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Stop once every key has been seen; record only the first row per key.
    FirstHit,
    /// Read the whole grid and record every row per key.
    AllHits,
}

/// Locate `keys` in columns `A:B` of `tab` by reading pages of `page_size` rows.
pub async fn locate_keys<S: SheetStore>(
    store: &S,
    tab: &str,
    keys: &HashSet<RowKey>,
    page_size: u32,
    mode: ScanMode,
) -> Result<HashMap<RowKey, Vec<u32>>, SheetError> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let total = store.row_count(tab).await?;
    let page_size = page_size.max(1);
    let mut pending: HashSet<RowKey> = keys.clone();
    let mut found: HashMap<RowKey, Vec<u32>> = HashMap::new();
    let mut start = 1;
    let mut pages = 0usize;

    while start <= total && (mode == ScanMode::AllHits || !pending.is_empty()) {
        let end = total.min(start.saturating_add(page_size - 1));
        let page = store
            .get(
                tab,
                &A1Range::rows(1, 2, RowSpan::new(start, end)),
                ValueRender::Formatted,
            )
            .await?;
        pages += 1;
        for (offset, row) in page.iter().enumerate() {
            let key = RowKey::from_row(row);
            let hit = match mode {
                ScanMode::FirstHit => pending.remove(&key),
                ScanMode::AllHits => keys.contains(&key),
            };
            if hit {
                found.entry(key).or_default().push(start + offset as u32);
            }
        }
        start = end + 1;
    }
    tracing::debug!(tab, pages, keys = keys.len(), found = found.len(), mode = ?mode, "key scan");
    Ok(found)
}

/// Read rows `A:G` for `indices`, one request per contiguous run.
async fn read_rows<S: SheetStore>(
    store: &S,
    tab: &str,
    indices: &[u32],
) -> Result<HashMap<u32, Row>, SheetError> {
    let mut rows = HashMap::new();
    for span in group_contiguous(indices) {
        let block = store
            .get(
                tab,
                &A1Range::rows(1, BANK_WIDTH, span),
                ValueRender::Formatted,
            )
            .await?;
        for (offset, row) in block.into_iter().enumerate() {
            rows.insert(span.start + offset as u32, row);
        }
    }
    Ok(rows)
}

/// Keys of the INC tab in first-seen order, header row skipped.
async fn read_inc_keys<S: SheetStore>(store: &S, tab: &str) -> Result<Vec<RowKey>, SheetError> {
    let rows = store
        .get(tab, &A1Range::open(1, 2, 1), ValueRender::Formatted)
        .await?;
    let skip = usize::from(rows.first().is_some_and(|r| is_header_like(r)));
    let mut seen = HashSet::new();
    Ok(rows
        .iter()
        .skip(skip)
        .map(|r| RowKey::from_row(r))
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect())
}

fn sample<T: Clone>(items: &[T], count: usize) -> Vec<T> {
    let count = count.min(items.len());
    rand::seq::index::sample(&mut rand::rng(), items.len(), count)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

async fn overwrite_runs<S: SheetStore>(
    store: &S,
    tab: &str,
    mut targets: Vec<(u32, Row)>,
    options: &TeleportOptions,
) -> Result<Vec<RowSpan>, SheetError> {
    targets.sort_by_key(|(row, _)| *row);
    let mut spans = Vec::new();
    for (start, rows) in contiguous_runs(targets) {
        for (i, chunk) in rows.chunks(options.batch_update_size).enumerate() {
            let first = start + (i * options.batch_update_size) as u32;
            let span = RowSpan::new(first, first + chunk.len() as u32 - 1);
            store
                .update(
                    tab,
                    &A1Range::rows(1, BANK_WIDTH, span),
                    chunk,
                    ValueInput::UserEntered,
                )
                .await?;
            tracing::debug!(tab, span = %span, "overwrote rows");
            spans.push(span);
            pause(options.batch_sleep).await;
        }
    }
    Ok(spans)
}

/// Recover where `chunk` landed by scanning pages back from the end of the
/// grid. The last occurrence of each appended key wins.
async fn locate_appended<S: SheetStore>(
    store: &S,
    tab: &str,
    chunk: &[Row],
    page_size: u32,
) -> Result<Option<RowSpan>, SheetError> {
    let wanted: HashSet<RowKey> = chunk.iter().map(|r| RowKey::from_row(r)).collect();
    let mut found: HashMap<RowKey, u32> = HashMap::new();
    let mut end = store.row_count(tab).await?;
    while end >= 1 && found.len() < wanted.len() {
        let start = end.saturating_sub(page_size.max(1) - 1).max(1);
        let page = store
            .get(
                tab,
                &A1Range::rows(1, 2, RowSpan::new(start, end)),
                ValueRender::Formatted,
            )
            .await?;
        for (offset, row) in page.iter().enumerate().rev() {
            let key = RowKey::from_row(row);
            if wanted.contains(&key) {
                found.entry(key).or_insert(start + offset as u32);
            }
        }
        end = start - 1;
    }
    tracing::debug!(tab, wanted = wanted.len(), found = found.len(), "located appended rows");
    Ok(match (found.values().min(), found.values().max()) {
        (Some(&start), Some(&end)) => Some(RowSpan::new(start, end)),
        _ => None,
    })
}

async fn append_chunks<S: SheetStore>(
    store: &S,
    tab: &str,
    rows: &[Row],
    options: &TeleportOptions,
) -> Result<Vec<RowSpan>, SheetError> {
    let mut spans = Vec::new();
    for chunk in rows.chunks(options.append_chunk) {
        let reported = store.append(tab, chunk, ValueInput::UserEntered).await?;
        let span = match reported {
            Some(span) => Some(span),
            None => locate_appended(store, tab, chunk, options.page_size).await?,
        };
        match span {
            Some(span) => spans.push(span),
            None => tracing::warn!(tab, rows = chunk.len(), "could not locate appended rows"),
        }
        pause(options.batch_sleep).await;
    }
    Ok(spans)
}

/// Copy the `H2:I2` formulas into blank `H:I` cells of each span.
async fn fill_formulas<S: SheetStore>(
    store: &S,
    tab: &str,
    spans: Vec<RowSpan>,
) -> Result<usize, SheetError> {
    if spans.is_empty() {
        return Ok(0);
    }
    let template = match store
        .get(tab, &A1Range::rows(8, 9, RowSpan::single(2)), ValueRender::Formula)
        .await
    {
        Ok(rows) => rows.into_iter().next().unwrap_or_default(),
        Err(err) => {
            tracing::warn!(tab, error = %err, "could not read H2:I2 template");
            return Ok(0);
        }
    };
    let template = fit_row(template, 2);

    let mut filled = 0;
    for span in merge_spans(spans) {
        let range = A1Range::rows(8, 9, span);
        let existing = store.get(tab, &range, ValueRender::Formula).await?;
        let mut changed = false;
        let rows: Vec<Row> = (0..span.height() as usize)
            .map(|offset| {
                let current = fit_row(existing.get(offset).cloned().unwrap_or_default(), 2);
                current
                    .into_iter()
                    .zip(template.iter())
                    .map(|(cell, fallback)| {
                        if cell.is_blank() && !fallback.is_blank() {
                            changed = true;
                            filled += 1;
                            fallback.clone()
                        } else {
                            cell
                        }
                    })
                    .collect()
            })
            .collect();
        if changed {
            store
                .update(tab, &range, &rows, ValueInput::UserEntered)
                .await?;
        }
    }
    Ok(filled)
}

async fn verify_sample<D: SheetStore>(
    dest: &D,
    tab: &str,
    payload: &HashMap<RowKey, Row>,
    options: &TeleportOptions,
) -> Result<(usize, usize), SheetError> {
    let keys: Vec<RowKey> = payload.keys().cloned().collect();
    let chosen = sample(&keys, options.sample_size);
    if chosen.is_empty() {
        return Ok((0, 0));
    }
    let wanted: HashSet<RowKey> = chosen.iter().cloned().collect();
    let found = locate_keys(dest, tab, &wanted, options.page_size, ScanMode::AllHits).await?;
    let canonical: HashMap<&RowKey, u32> = found
        .iter()
        .filter_map(|(k, rows)| rows.iter().min().map(|r| (k, *r)))
        .collect();
    let indices: Vec<u32> = canonical.values().copied().collect();
    let rows = read_rows(dest, tab, &indices).await?;

    let mut mismatches = 0;
    for key in &chosen {
        let Some(row) = canonical.get(key) else {
            tracing::error!(key = %key, "verification: key missing in destination");
            mismatches += 1;
            continue;
        };
        let actual = rows.get(row).map(Vec::as_slice).unwrap_or_default();
        let expected = payload.get(key).map(Vec::as_slice).unwrap_or_default();
        if !rows_equal(actual, expected) {
            tracing::error!(key = %key, row, "verification mismatch");
            mismatches += 1;
        }
    }
    Ok((chosen.len(), mismatches))
}

/// Replicate the rows named by the INC tab from `source` NEW into `dest` FINAL.
pub async fn replicate<S: SheetStore, D: SheetStore>(
    source: &S,
    dest: &D,
    options: &TeleportOptions,
) -> Result<TeleportReport, SheetError> {
    let mut report = TeleportReport::default();

    let inc_keys = read_inc_keys(source, &options.inc_tab).await?;
    report.keys_read = inc_keys.len();
    if inc_keys.is_empty() {
        tracing::info!(tab = %options.inc_tab, "no keys to replicate");
        return Ok(report);
    }
    tracing::info!(keys = inc_keys.len(), tab = %options.inc_tab, "read incremental keys");

    let wanted: HashSet<RowKey> = inc_keys.iter().cloned().collect();
    let src_found = locate_keys(
        source,
        &options.new_tab,
        &wanted,
        options.page_size,
        ScanMode::FirstHit,
    )
    .await?;
    let src_index: HashMap<&RowKey, u32> = src_found
        .iter()
        .filter_map(|(k, rows)| rows.iter().min().map(|r| (k, *r)))
        .collect();
    report.missing_keys = inc_keys.iter().filter(|k| !src_index.contains_key(k)).count();
    if report.missing_keys > 0 {
        tracing::warn!(missing = report.missing_keys, tab = %options.new_tab, "keys not found in source; skipping them");
    }

    let indices: Vec<u32> = src_index.values().copied().collect();
    let src_rows = read_rows(source, &options.new_tab, &indices).await?;
    let mut order: Vec<RowKey> = Vec::new();
    let mut payload: HashMap<RowKey, Row> = HashMap::new();
    for key in &inc_keys {
        let Some(idx) = src_index.get(key) else {
            continue;
        };
        match src_rows.get(idx) {
            Some(row) if !row.is_empty() => {
                order.push(key.clone());
                payload.insert(key.clone(), fit_row(row.clone(), BANK_WIDTH as usize));
            }
            _ => tracing::warn!(key = %key, row = idx, "source row vanished; skipping"),
        }
    }
    if payload.is_empty() {
        tracing::info!("nothing to apply");
        return Ok(report);
    }

    let targets: HashSet<RowKey> = order.iter().cloned().collect();
    let mut dest_found = locate_keys(
        dest,
        &options.final_tab,
        &targets,
        options.page_size,
        ScanMode::AllHits,
    )
    .await?;

    let mut duplicates: Vec<u32> = Vec::new();
    let mut appends: Vec<Row> = Vec::new();
    for key in &order {
        match dest_found.get_mut(key) {
            Some(rows) if !rows.is_empty() => {
                rows.sort_unstable();
                rows.dedup();
                duplicates.extend_from_slice(&rows[1..]);
            }
            _ => appends.push(payload[key].clone()),
        }
    }
    tracing::info!(
        overwrites = order.len() - appends.len(),
        appends = appends.len(),
        duplicates = duplicates.len(),
        "replication plan"
    );

    if !duplicates.is_empty() {
        for span in group_contiguous(&duplicates).into_iter().rev() {
            dest.delete_rows(&options.final_tab, span).await?;
            tracing::debug!(span = %span, "deleted duplicate rows");
        }
        report.duplicates_deleted = duplicates.len();
        dest_found = locate_keys(
            dest,
            &options.final_tab,
            &targets,
            options.page_size,
            ScanMode::AllHits,
        )
        .await?;
    }

    let overwrites: Vec<(u32, Row)> = order
        .iter()
        .filter_map(|key| {
            let row = dest_found.get(key)?.iter().min()?;
            Some((*row, payload[key].clone()))
        })
        .collect();
    report.overwrites = overwrites.len();
    report.appends = appends.len();

    if !appends.is_empty() {
        let current = dest.row_count(&options.final_tab).await?;
        let projected = current + appends.len() as u32 + options.row_buffer;
        if projected > current {
            tracing::info!(current, projected, "growing destination grid");
            dest.add_rows(&options.final_tab, projected - current).await?;
        }
    }

    let mut spans = overwrite_runs(dest, &options.final_tab, overwrites, options).await?;
    spans.extend(append_chunks(dest, &options.final_tab, &appends, options).await?);

    report.formula_rows_filled = fill_formulas(dest, &options.final_tab, spans).await?;

    let (verified, mismatches) =
        verify_sample(dest, &options.final_tab, &payload, options).await?;
    report.verified = verified;
    report.verification_mismatches = mismatches;

    tracing::info!(
        overwrites = report.overwrites,
        appends = report.appends,
        duplicates_deleted = report.duplicates_deleted,
        verification_mismatches = report.verification_mismatches,
        missing_keys = report.missing_keys,
        "replication complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Failure, MemorySheets, OpKind};
    use tally_types::Cell;

    fn bank_row(values: &[&str]) -> Row {
        fit_row(
            values.iter().map(|v| Cell::text(*v)).collect(),
            BANK_WIDTH as usize,
        )
    }

    fn header() -> Row {
        bank_row(&["DATE", "SYMBOL", "CLOSE", "LOW", "HIGH", "VOLUME", "TYPE"])
    }

    fn options() -> TeleportOptions {
        TeleportOptions {
            page_size: 2,
            batch_sleep: Duration::ZERO,
            ..TeleportOptions::default()
        }
    }

    fn source(inc: Vec<Row>, new: Vec<Row>) -> MemorySheets {
        let mut inc_rows = vec![header()];
        inc_rows.extend(inc);
        let mut new_rows = vec![header()];
        new_rows.extend(new);
        MemorySheets::new()
            .with_grid("BANK_INC", inc_rows, 20)
            .with_grid("BANK_NEW", new_rows, 20)
    }

    #[test]
    fn sample_is_bounded_and_distinct() {
        let items: Vec<u32> = (0..50).collect();
        let picked = sample(&items, 10);
        assert_eq!(picked.len(), 10);
        let unique: HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 10);
        assert_eq!(sample(&items, 100).len(), 50);
        assert!(sample::<u32>(&[], 5).is_empty());
    }

    #[tokio::test]
    async fn first_hit_scan_stops_early() {
        let store = source(
            vec![],
            vec![
                bank_row(&["2025-07-16", "NSE:TCS"]),
                bank_row(&["2025-07-16", "NSE:INFY"]),
                bank_row(&["2025-07-16", "NSE:TCS"]),
                bank_row(&["2025-07-17", "NSE:TCS"]),
            ],
        );
        let keys: HashSet<RowKey> = [RowKey::new("2025-07-16", "NSE:TCS")].into();
        let found = locate_keys(&store, "BANK_NEW", &keys, 2, ScanMode::FirstHit)
            .await
            .unwrap();
        assert_eq!(found[&RowKey::new("2025-07-16", "NSE:TCS")], vec![2]);
        assert_eq!(store.count(OpKind::Get, "BANK_NEW"), 1);

        let all = locate_keys(&store, "BANK_NEW", &keys, 2, ScanMode::AllHits)
            .await
            .unwrap();
        assert_eq!(all[&RowKey::new("2025-07-16", "NSE:TCS")], vec![2, 4]);
    }

    #[tokio::test]
    async fn keys_match_across_date_spellings() {
        let store = source(
            vec![],
            vec![bank_row(&["16-Jul-2025", "NSE:TCS"])],
        );
        let keys: HashSet<RowKey> = [RowKey::new("2025-07-16", "NSE:TCS")].into();
        let found = locate_keys(&store, "BANK_NEW", &keys, 10, ScanMode::FirstHit)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn upserts_dedupes_and_fills_formulas() {
        let src = source(
            vec![
                bank_row(&["2025-07-16", "NSE:TCS"]),
                bank_row(&["2025-07-16", "NSE:INFY"]),
                bank_row(&["2025-07-16", "NSE:GONE"]),
            ],
            vec![
                bank_row(&["2025-07-15", "NSE:TCS", "3990"]),
                bank_row(&["2025-07-16", "NSE:TCS", "4000", "3950", "4050", "12.5", "EQ"]),
                bank_row(&["2025-07-16", "NSE:INFY", "1600", "1580", "1610", "8.1", "EQ"]),
            ],
        );
        let mut final_rows = vec![fit_row(
            {
                let mut h = header();
                h.push(Cell::text("CHG"));
                h.push(Cell::text("PCT"));
                h
            },
            9,
        )];
        let mut first = bank_row(&["2025-07-15", "NSE:TCS", "3990"]);
        first.extend([Cell::text("=C2-C1"), Cell::text("=H2/C2")]);
        final_rows.push(first);
        final_rows.push(bank_row(&["2025-07-16", "NSE:TCS", "1"]));
        final_rows.push(bank_row(&["2025-07-15", "NSE:SBIN", "800"]));
        final_rows.push(bank_row(&["2025-07-16", "NSE:TCS", "2"]));
        let dest = MemorySheets::new().with_grid("BANK_FINAL", final_rows, 6);

        let report = replicate(&src, &dest, &options()).await.unwrap();
        assert_eq!(report.keys_read, 3);
        assert_eq!(report.missing_keys, 1);
        assert_eq!(report.overwrites, 1);
        assert_eq!(report.appends, 1);
        assert_eq!(report.duplicates_deleted, 1);
        assert_eq!(report.verified, 2);
        assert_eq!(report.verification_mismatches, 0);

        let rows = dest.rows("BANK_FINAL");
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[2][2], Cell::text("4000"));
        assert_eq!(rows[3][1], Cell::text("NSE:SBIN"));
        assert_eq!(rows[4][1], Cell::text("NSE:INFY"));
        assert_eq!(rows[4][7], Cell::text("=C2-C1"));
        assert_eq!(rows[2][8], Cell::text("=H2/C2"));
        assert_eq!(report.formula_rows_filled, 4);
    }

    #[tokio::test]
    async fn appends_without_reported_range_are_found_by_tail_scan() {
        let src = source(
            vec![
                bank_row(&["2025-07-16", "NSE:TCS"]),
                bank_row(&["2025-07-16", "NSE:INFY"]),
            ],
            vec![
                bank_row(&["2025-07-16", "NSE:TCS", "4000", "3950", "4050", "12.5", "EQ"]),
                bank_row(&["2025-07-16", "NSE:INFY", "1600", "1580", "1610", "8.1", "EQ"]),
            ],
        );
        let mut final_header = header();
        final_header.extend([Cell::text("CHG"), Cell::text("PCT")]);
        let mut first = bank_row(&["2025-07-15", "NSE:TCS", "3990"]);
        first.extend([Cell::text("=C2-C1"), Cell::text("=H2/C2")]);
        let dest = MemorySheets::new()
            .with_grid("BANK_FINAL", vec![final_header, first], 40)
            .without_append_ranges();
        let options = TeleportOptions {
            row_buffer: 10,
            ..options()
        };

        let report = replicate(&src, &dest, &options).await.unwrap();
        assert_eq!(report.appends, 2);
        assert_eq!(report.formula_rows_filled, 4);
        assert_eq!(report.verified, 2);
        assert_eq!(report.verification_mismatches, 0);

        let rows = dest.rows("BANK_FINAL");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2][1], Cell::text("NSE:TCS"));
        assert_eq!(rows[3][1], Cell::text("NSE:INFY"));
        assert_eq!(rows[2][7], Cell::text("=C2-C1"));
        assert_eq!(rows[3][8], Cell::text("=H2/C2"));
        assert_eq!(dest.grid_rows("BANK_FINAL"), 52);
    }

    #[tokio::test]
    async fn empty_inc_is_a_no_op() {
        let src = source(vec![], vec![bank_row(&["2025-07-16", "NSE:TCS"])]);
        let dest = MemorySheets::new().with_tab("BANK_FINAL", vec![header()]);
        let report = replicate(&src, &dest, &options()).await.unwrap();
        assert_eq!(report, TeleportReport::default());
        assert!(dest.ops().is_empty());
    }

    #[tokio::test]
    async fn source_read_errors_propagate() {
        let src = source(
            vec![bank_row(&["2025-07-16", "NSE:TCS"])],
            vec![bank_row(&["2025-07-16", "NSE:TCS"])],
        );
        src.fail_next(OpKind::Get, 1, Failure::Rejected);
        let dest = MemorySheets::new().with_tab("BANK_FINAL", vec![header()]);
        assert!(replicate(&src, &dest, &options()).await.is_err());
    }
}
