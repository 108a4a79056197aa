//! A1 notation, row spans, and run grouping.

use std::fmt;

use thiserror::Error;

/// Inclusive, 1-based interval of sheet rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowSpan {
    pub start: u32,
    pub end: u32,
}

impl RowSpan {
    #[must_use]
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start >= 1 && start <= end, "invalid span {start}..={end}");
        Self { start, end }
    }

    #[must_use]
    pub fn single(row: u32) -> Self {
        Self::new(row, row)
    }

    #[must_use]
    pub fn height(self) -> u32 {
        self.end - self.start + 1
    }

    pub fn rows(self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for RowSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// 1-based column number to letters (`1 -> A`, `27 -> AA`).
#[must_use]
pub fn column_letter(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Letters to a 1-based column number. Returns `None` on anything but ASCII letters.
#[must_use]
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, ch| {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = u32::from(ch.to_ascii_uppercase() as u8 - b'A' + 1);
        acc.checked_mul(26)?.checked_add(digit)
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid A1 reference: {0}")]
pub struct A1ParseError(pub String);

/// Last-column sentinel for ranges with no right edge.
const OPEN_COL: u32 = u32::MAX;

/// A rectangular A1 range on one tab. `last_row == None` leaves the range open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct A1Range {
    first_col: u32,
    last_col: u32,
    first_row: u32,
    last_row: Option<u32>,
    whole: bool,
}

impl A1Range {
    /// Columns `first_col..=last_col` across `span`.
    #[must_use]
    pub fn rows(first_col: u32, last_col: u32, span: RowSpan) -> Self {
        Self {
            first_col,
            last_col,
            first_row: span.start,
            last_row: Some(span.end),
            whole: false,
        }
    }

    /// Columns `first_col..=last_col` from `first_row` to the end of the sheet.
    #[must_use]
    pub fn open(first_col: u32, last_col: u32, first_row: u32) -> Self {
        Self {
            first_col,
            last_col,
            first_row,
            last_row: None,
            whole: false,
        }
    }

    /// Every column of the rows in `span`, rendered as `2:11`.
    #[must_use]
    pub fn full_rows(span: RowSpan) -> Self {
        Self::rows(1, OPEN_COL, span)
    }

    #[must_use]
    pub fn cell(col: u32, row: u32) -> Self {
        Self::rows(col, col, RowSpan::single(row))
    }

    /// Every populated cell of the tab.
    #[must_use]
    pub fn whole() -> Self {
        Self {
            first_col: 1,
            last_col: u32::MAX,
            first_row: 1,
            last_row: None,
            whole: true,
        }
    }

    /// Parse `H1` or `A2:G10`.
    pub fn parse(reference: &str) -> Result<Self, A1ParseError> {
        let err = || A1ParseError(reference.to_string());
        let (first, last) = match reference.split_once(':') {
            Some((a, b)) => (a, Some(b)),
            None => (reference, None),
        };
        let (first_col, first_row) = split_cell(first).ok_or_else(err)?;
        let first_row = first_row.ok_or_else(err)?;
        let (last_col, last_row) = match last {
            Some(last) => split_cell(last).ok_or_else(err)?,
            None => (first_col, Some(first_row)),
        };
        if last_col < first_col || last_row.is_some_and(|r| r < first_row) {
            return Err(err());
        }
        Ok(Self {
            first_col,
            last_col,
            first_row,
            last_row,
            whole: false,
        })
    }

    #[must_use]
    pub const fn is_whole(&self) -> bool {
        self.whole
    }

    #[must_use]
    pub const fn first_col(&self) -> u32 {
        self.first_col
    }

    #[must_use]
    pub const fn last_col(&self) -> u32 {
        self.last_col
    }

    #[must_use]
    pub const fn first_row(&self) -> u32 {
        self.first_row
    }

    #[must_use]
    pub const fn last_row(&self) -> Option<u32> {
        self.last_row
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.last_col.saturating_sub(self.first_col) + 1
    }
}

fn split_cell(cell: &str) -> Option<(u32, Option<u32>)> {
    let cell = cell.trim();
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let col = column_index(letters)?;
    if digits.is_empty() {
        return Some((col, None));
    }
    let row = digits.parse::<u32>().ok().filter(|r| *r >= 1)?;
    Some((col, Some(row)))
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.whole {
            return Ok(());
        }
        if self.last_col == OPEN_COL
            && let Some(last_row) = self.last_row
        {
            return write!(f, "{}:{last_row}", self.first_row);
        }
        let first = column_letter(self.first_col);
        let last = column_letter(self.last_col);
        match self.last_row {
            Some(last_row) if last_row == self.first_row && self.first_col == self.last_col => {
                write!(f, "{first}{}", self.first_row)
            }
            Some(last_row) => write!(f, "{first}{}:{last}{last_row}", self.first_row),
            None => write!(f, "{first}{}:{last}", self.first_row),
        }
    }
}

/// Collapse indices into maximal runs of consecutive rows.
#[must_use]
pub fn group_contiguous(indices: &[u32]) -> Vec<RowSpan> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut spans = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return spans;
    };
    let (mut start, mut prev) = (first, first);
    for idx in iter {
        if idx == prev + 1 {
            prev = idx;
        } else {
            spans.push(RowSpan::new(start, prev));
            start = idx;
            prev = idx;
        }
    }
    spans.push(RowSpan::new(start, prev));
    spans
}

/// Merge overlapping or adjacent spans.
#[must_use]
pub fn merge_spans(mut spans: Vec<RowSpan>) -> Vec<RowSpan> {
    spans.sort_unstable();
    let mut merged: Vec<RowSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end + 1 => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Group `(row, payload)` pairs into runs of consecutive rows, sorted by row.
#[must_use]
pub fn contiguous_runs<T>(mut items: Vec<(u32, T)>) -> Vec<(u32, Vec<T>)> {
    items.sort_by_key(|(row, _)| *row);
    let mut runs: Vec<(u32, Vec<T>)> = Vec::new();
    let mut prev: Option<u32> = None;
    for (row, payload) in items {
        match (runs.last_mut(), prev) {
            (Some((_, run)), Some(p)) if row == p + 1 => run.push(payload),
            _ => runs.push((row, vec![payload])),
        }
        prev = Some(row);
    }
    runs
}
