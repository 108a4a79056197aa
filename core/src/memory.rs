//! In-memory [`SheetStore`] with grid limits, an operation log, and failure
//! injection.
//!
//! Values are stored as entered. Formulas are kept as text and never evaluated,
//! so an unformatted read returns the formula itself.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tally_types::{A1Range, Cell, NumberFormat, Row, RowSpan, ValueInput, ValueRender};

use crate::ports::{SheetError, SheetStore};

/// Default grid height of a freshly created tab.
pub const DEFAULT_GRID_ROWS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Get,
    Update,
    Append,
    Clear,
    DeleteRows,
    AddRows,
    Format,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetOp {
    pub kind: OpKind,
    pub tab: String,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    RateLimited,
    Rejected,
}

#[derive(Debug, Default)]
struct Tab {
    rows: Vec<Row>,
    row_count: u32,
}

impl Tab {
    /// Last populated row, 1-based; 0 when the tab is empty.
    fn used_rows(&self) -> u32 {
        self.rows
            .iter()
            .rposition(|r| r.iter().any(|c| !c.is_blank()))
            .map_or(0, |i| i as u32 + 1)
    }

    fn write(&mut self, row: u32, col: u32, cell: Cell) {
        let (r, c) = ((row - 1) as usize, (col - 1) as usize);
        if self.rows.len() <= r {
            self.rows.resize(r + 1, Vec::new());
        }
        let target = &mut self.rows[r];
        if target.len() <= c {
            target.resize(c + 1, Cell::Empty);
        }
        target[c] = cell;
    }
}

#[derive(Debug, Default)]
struct State {
    tabs: HashMap<String, Tab>,
    formats: Vec<(String, A1Range, NumberFormat)>,
    ops: Vec<SheetOp>,
    failures: HashMap<OpKind, VecDeque<Failure>>,
    hide_append_ranges: bool,
}

#[derive(Debug, Default)]
pub struct MemorySheets {
    state: Mutex<State>,
}

fn trim_row(row: &[Cell]) -> Row {
    let end = row.iter().rposition(|c| !c.is_blank()).map_or(0, |i| i + 1);
    row[..end].to_vec()
}

fn render_cell(cell: &Cell, render: ValueRender) -> Cell {
    match (render, cell) {
        (ValueRender::Formatted, Cell::Number(_) | Cell::Bool(_)) => Cell::text(cell.as_text()),
        _ => cell.clone(),
    }
}

impl MemorySheets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tab holding `rows`, with at least [`DEFAULT_GRID_ROWS`] grid rows.
    #[must_use]
    pub fn with_tab(self, name: &str, rows: Vec<Row>) -> Self {
        let row_count = (rows.len() as u32).max(DEFAULT_GRID_ROWS);
        self.with_grid(name, rows, row_count)
    }

    #[must_use]
    pub fn with_grid(self, name: &str, rows: Vec<Row>, row_count: u32) -> Self {
        self.lock().tabs.insert(
            name.to_string(),
            Tab {
                row_count: row_count.max(rows.len() as u32),
                rows,
            },
        );
        self
    }

    /// Make `append` report no updated range, like a backend that omits it.
    #[must_use]
    pub fn without_append_ranges(self) -> Self {
        self.lock().hide_append_ranges = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `times` operations of `kind`.
    pub fn fail_next(&self, kind: OpKind, times: usize, failure: Failure) {
        self.lock()
            .failures
            .entry(kind)
            .or_default()
            .extend(std::iter::repeat_n(failure, times));
    }

    /// Populated rows of a tab, trailing blanks trimmed.
    #[must_use]
    pub fn rows(&self, tab: &str) -> Vec<Row> {
        let state = self.lock();
        let Some(t) = state.tabs.get(tab) else {
            return Vec::new();
        };
        t.rows[..t.used_rows() as usize]
            .iter()
            .map(|r| trim_row(r))
            .collect()
    }

    /// Value of a single cell by A1 reference such as `H1`.
    #[must_use]
    pub fn cell(&self, tab: &str, reference: &str) -> Cell {
        let Ok(range) = A1Range::parse(reference) else {
            return Cell::Empty;
        };
        let state = self.lock();
        state
            .tabs
            .get(tab)
            .and_then(|t| t.rows.get(range.first_row() as usize - 1))
            .and_then(|r| r.get(range.first_col() as usize - 1))
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn grid_rows(&self, tab: &str) -> u32 {
        self.lock().tabs.get(tab).map_or(0, |t| t.row_count)
    }

    #[must_use]
    pub fn formats(&self, tab: &str) -> Vec<(A1Range, NumberFormat)> {
        self.lock()
            .formats
            .iter()
            .filter(|(t, ..)| t == tab)
            .map(|(_, range, format)| (*range, format.clone()))
            .collect()
    }

    #[must_use]
    pub fn ops(&self) -> Vec<SheetOp> {
        self.lock().ops.clone()
    }

    #[must_use]
    pub fn count(&self, kind: OpKind, tab: &str) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| op.kind == kind && op.tab == tab)
            .count()
    }
}

/// Record the operation and fire any pending failure for it.
fn begin(state: &mut State, kind: OpKind, tab: &str, detail: String) -> Result<(), SheetError> {
    state.ops.push(SheetOp {
        kind,
        tab: tab.to_string(),
        detail: detail.clone(),
    });
    match state.failures.get_mut(&kind).and_then(VecDeque::pop_front) {
        Some(Failure::RateLimited) => Err(SheetError::RateLimited(format!(
            "quota exceeded for {kind:?} on {tab}"
        ))),
        Some(Failure::Rejected) => Err(SheetError::InvalidRange {
            range: detail,
            reason: "rejected".into(),
        }),
        None => Ok(()),
    }
}

fn tab_mut<'a>(state: &'a mut State, tab: &str) -> Result<&'a mut Tab, SheetError> {
    state
        .tabs
        .get_mut(tab)
        .ok_or_else(|| SheetError::UnknownTab(tab.to_string()))
}

impl SheetStore for MemorySheets {
    async fn row_count(&self, tab: &str) -> Result<u32, SheetError> {
        let state = self.lock();
        state
            .tabs
            .get(tab)
            .map(|t| t.row_count)
            .ok_or_else(|| SheetError::UnknownTab(tab.to_string()))
    }

    async fn get(
        &self,
        tab: &str,
        range: &A1Range,
        render: ValueRender,
    ) -> Result<Vec<Row>, SheetError> {
        let mut state = self.lock();
        begin(&mut state, OpKind::Get, tab, range.to_string())?;
        let t = tab_mut(&mut state, tab)?;

        let used = t.used_rows();
        let first = range.first_row();
        let last = range.last_row().unwrap_or(used).min(used);
        if first > last {
            return Ok(Vec::new());
        }
        let (c0, c1) = (range.first_col() as usize - 1, range.last_col() as usize);
        let mut out: Vec<Row> = (first..=last)
            .map(|r| {
                let row = &t.rows[(r - 1) as usize];
                let end = c1.min(row.len());
                let slice = if c0 < end { &row[c0..end] } else { &[][..] };
                trim_row(slice)
                    .iter()
                    .map(|c| render_cell(c, render))
                    .collect()
            })
            .collect();
        while out.last().is_some_and(Vec::is_empty) {
            out.pop();
        }
        Ok(out)
    }

    async fn update(
        &self,
        tab: &str,
        range: &A1Range,
        rows: &[Row],
        _input: ValueInput,
    ) -> Result<(), SheetError> {
        let mut state = self.lock();
        begin(&mut state, OpKind::Update, tab, range.to_string())?;
        let t = tab_mut(&mut state, tab)?;

        let height = rows.len() as u32;
        let last = range.first_row() + height.saturating_sub(1);
        if range.last_row().is_some_and(|end| last > end)
            || rows.iter().any(|r| r.len() as u32 > range.width())
        {
            return Err(SheetError::InvalidRange {
                range: range.to_string(),
                reason: "data exceeds the requested range".into(),
            });
        }
        if height > 0 && last > t.row_count {
            return Err(SheetError::InvalidRange {
                range: range.to_string(),
                reason: format!("exceeds grid limits (max rows {})", t.row_count),
            });
        }
        for (offset, row) in rows.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                t.write(
                    range.first_row() + offset as u32,
                    range.first_col() + col as u32,
                    cell.clone(),
                );
            }
        }
        Ok(())
    }

    async fn append(
        &self,
        tab: &str,
        rows: &[Row],
        _input: ValueInput,
    ) -> Result<Option<RowSpan>, SheetError> {
        if rows.is_empty() {
            return Ok(None);
        }
        let mut state = self.lock();
        begin(&mut state, OpKind::Append, tab, format!("{} rows", rows.len()))?;
        let t = tab_mut(&mut state, tab)?;

        let start = t.used_rows() + 1;
        let span = RowSpan::new(start, start + rows.len() as u32 - 1);
        t.rows.truncate(start as usize - 1);
        t.rows.extend(rows.iter().cloned());
        t.row_count = t.row_count.max(span.end);
        Ok((!state.hide_append_ranges).then_some(span))
    }

    async fn clear(&self, tab: &str, ranges: &[A1Range]) -> Result<(), SheetError> {
        let mut state = self.lock();
        let detail = ranges
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        begin(&mut state, OpKind::Clear, tab, detail)?;
        let t = tab_mut(&mut state, tab)?;

        for range in ranges {
            if range.is_whole() {
                t.rows.clear();
                continue;
            }
            let last = range.last_row().unwrap_or(u32::MAX).min(t.rows.len() as u32);
            for r in range.first_row()..=last {
                let row = &mut t.rows[(r - 1) as usize];
                let end = (range.last_col() as usize).min(row.len());
                for cell in row.iter_mut().take(end).skip(range.first_col() as usize - 1) {
                    *cell = Cell::Empty;
                }
            }
        }
        Ok(())
    }

    async fn delete_rows(&self, tab: &str, span: RowSpan) -> Result<(), SheetError> {
        let mut state = self.lock();
        begin(&mut state, OpKind::DeleteRows, tab, span.to_string())?;
        let t = tab_mut(&mut state, tab)?;

        if span.end > t.row_count {
            return Err(SheetError::InvalidRange {
                range: span.to_string(),
                reason: format!("beyond grid of {} rows", t.row_count),
            });
        }
        let start = (span.start - 1) as usize;
        let end = (span.end as usize).min(t.rows.len());
        if start < end {
            t.rows.drain(start..end);
        }
        t.row_count -= span.height();
        Ok(())
    }

    async fn add_rows(&self, tab: &str, count: u32) -> Result<(), SheetError> {
        let mut state = self.lock();
        begin(&mut state, OpKind::AddRows, tab, count.to_string())?;
        tab_mut(&mut state, tab)?.row_count += count;
        Ok(())
    }

    async fn set_number_format(
        &self,
        tab: &str,
        range: &A1Range,
        format: &NumberFormat,
    ) -> Result<(), SheetError> {
        let mut state = self.lock();
        begin(&mut state, OpKind::Format, tab, range.to_string())?;
        tab_mut(&mut state, tab)?;
        state
            .formats
            .push((tab.to_string(), *range, format.clone()));
        Ok(())
    }
}
