//! Header-keyed views over tab values.

use tally_types::{A1Range, Cell, Row, ValueRender, cell_text};

use crate::ports::{SheetError, SheetStore};

/// A tab read as a header row plus data rows. Row numbers are 1-based sheet rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Records {
    header: Vec<String>,
    rows: Vec<Row>,
}

impl Records {
    /// First row is the header; the rest start at sheet row 2.
    #[must_use]
    pub fn from_rows(mut rows: Vec<Row>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let header = rows.remove(0).iter().map(Cell::as_text).collect();
        Self { header, rows }
    }

    pub async fn load<S: SheetStore>(
        store: &S,
        tab: &str,
        render: ValueRender,
    ) -> Result<Self, SheetError> {
        let rows = store.get(tab, &A1Range::whole(), render).await?;
        Ok(Self::from_rows(rows))
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first header equal to `name`, ignoring case and padding.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
    }

    /// First column matching any of `names`.
    #[must_use]
    pub fn column_any(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.column(n))
    }

    /// `(sheet_row, row)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows.iter().enumerate().map(|(i, r)| (i as u32 + 2, r))
    }

    /// Trimmed text of the named column; blank when the column is absent.
    #[must_use]
    pub fn text(&self, row: &[Cell], name: &str) -> String {
        self.column(name)
            .map(|idx| cell_text(row, idx))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn cell<'r>(&self, row: &'r [Cell], name: &str) -> Option<&'r Cell> {
        self.column(name).and_then(|idx| row.get(idx))
    }
}

/// Read one cell by A1 reference.
pub async fn read_cell<S: SheetStore>(
    store: &S,
    tab: &str,
    reference: &str,
    render: ValueRender,
) -> Result<Cell, SheetError> {
    let range = A1Range::parse(reference).map_err(|e| SheetError::InvalidRange {
        range: reference.to_string(),
        reason: e.to_string(),
    })?;
    let rows = store.get(tab, &range, render).await?;
    Ok(rows
        .into_iter()
        .next()
        .and_then(|r| r.into_iter().next())
        .unwrap_or_default())
}

/// Write one cell by A1 reference.
pub async fn write_cell<S: SheetStore>(
    store: &S,
    tab: &str,
    reference: &str,
    value: Cell,
) -> Result<(), SheetError> {
    let range = A1Range::parse(reference).map_err(|e| SheetError::InvalidRange {
        range: reference.to_string(),
        reason: e.to_string(),
    })?;
    store
        .update(tab, &range, &[vec![value]], tally_types::ValueInput::UserEntered)
        .await
}
