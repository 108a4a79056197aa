//! Composite (date, symbol) ledger keys.

use std::fmt;

use chrono::NaiveDate;

use crate::cell::{Cell, cell_text};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%b-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Identity of a ledger row: trading date plus exchange-qualified symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub date: String,
    pub symbol: String,
}

impl RowKey {
    /// Build a key, trimming both parts and canonicalizing recognizable dates.
    pub fn new(date: impl AsRef<str>, symbol: impl AsRef<str>) -> Self {
        let date = date.as_ref().trim();
        let date = normalize_date_text(date).unwrap_or_else(|| date.to_string());
        Self {
            date,
            symbol: symbol.as_ref().trim().to_string(),
        }
    }

    /// Key from the first two cells of a row.
    #[must_use]
    pub fn from_row(row: &[Cell]) -> Self {
        Self::new(cell_text(row, 0), cell_text(row, 1))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.date.is_empty() && self.symbol.is_empty()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.date, self.symbol)
    }
}

/// `=DATE(2025,7,16)` to `2025-07-16`.
#[must_use]
pub fn parse_date_formula(formula: &str) -> Option<NaiveDate> {
    let inner = formula
        .trim()
        .strip_prefix("=DATE(")?
        .strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim().parse::<u32>());
    let year = parts.next()?.ok()?;
    let month = parts.next()?.ok()?;
    let day = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

/// Parse any date spelling the ledgers use.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(date) = parse_date_formula(text) {
        return Some(date);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Canonical `YYYY-MM-DD` form, or `None` when the text is not a date.
#[must_use]
pub fn normalize_date_text(text: &str) -> Option<String> {
    parse_date(text).map(|d| d.format("%Y-%m-%d").to_string())
}

#[must_use]
pub fn date_formula(date: NaiveDate) -> String {
    use chrono::Datelike;
    format!("=DATE({},{},{})", date.year(), date.month(), date.day())
}

/// `16-Jul-2025`, the display format of every ledger date column.
#[must_use]
pub fn display_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

/// A first row that names the key columns instead of holding data.
#[must_use]
pub fn is_header_like(row: &[Cell]) -> bool {
    row.iter().any(|cell| {
        let text = cell.as_text();
        text.eq_ignore_ascii_case("DATE") || text.eq_ignore_ascii_case("SYMBOL")
    })
}
