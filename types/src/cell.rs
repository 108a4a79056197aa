//! Spreadsheet cell values.
//!
//! The Sheets values API speaks JSON scalars: formatted reads return strings,
//! unformatted reads return numbers and booleans, and writes accept any of them.
//! [`Cell`] is the lossless middle ground used by every job.

use std::fmt;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

pub type Row = Vec<Cell>;

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }

    /// A numeric cell, or `Empty` when the value is not finite.
    #[must_use]
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Empty
        }
    }

    #[must_use]
    pub fn from_option(value: Option<f64>) -> Self {
        value.map_or(Self::Empty, Self::number)
    }

    /// Trimmed textual form, as a spreadsheet user would read it.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }

    /// Numeric view; text is parsed after stripping thousands separators.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.replace(',', "").trim().parse::<f64>().ok(),
            Self::Empty | Self::Bool(_) => None,
        }
    }

    #[must_use]
    pub fn is_formula(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim_start().starts_with('='))
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => Self::Empty,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n.as_f64().map_or(Self::Empty, Self::Number),
            Value::String(s) => Self::text(s),
            other => Self::Text(other.to_string()),
        })
    }
}

/// Trimmed text of the cell at `idx`, blank when the row is short.
#[must_use]
pub fn cell_text(row: &[Cell], idx: usize) -> String {
    row.get(idx).map(Cell::as_text).unwrap_or_default()
}

/// Compare rows cell by cell on trimmed text, treating missing cells as blank.
#[must_use]
pub fn rows_equal(a: &[Cell], b: &[Cell]) -> bool {
    let len = a.len().max(b.len());
    (0..len).all(|i| cell_text(a, i) == cell_text(b, i))
}

/// Pad or truncate a row to exactly `width` cells.
#[must_use]
pub fn fit_row(mut row: Row, width: usize) -> Row {
    row.resize(width, Cell::Empty);
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(Cell::Number(100.0).as_text(), "100");
        assert_eq!(Cell::Number(12.5).as_text(), "12.5");
    }

    #[test]
    fn deserializes_any_scalar() {
        let row: Row = serde_json::from_str(r#"["a", 1.5, true, null, ""]"#).unwrap();
        assert_eq!(
            row,
            vec![
                Cell::Text("a".into()),
                Cell::Number(1.5),
                Cell::Bool(true),
                Cell::Empty,
                Cell::Empty,
            ]
        );
    }

    #[test]
    fn serializes_empty_as_blank_string() {
        let json = serde_json::to_string(&vec![Cell::Empty, Cell::Number(2.0)]).unwrap();
        assert_eq!(json, r#"["",2.0]"#);
    }

    #[test]
    fn rows_equal_ignores_padding_and_whitespace() {
        let a = vec![Cell::text(" 2025-01-02 "), Cell::text("NSE:TCS")];
        let b = vec![
            Cell::text("2025-01-02"),
            Cell::text("NSE:TCS"),
            Cell::Empty,
        ];
        assert!(rows_equal(&a, &b));
        assert!(!rows_equal(&a, &[Cell::text("2025-01-02")]));
    }

    #[test]
    fn numeric_text_parses_with_separators() {
        assert_eq!(Cell::text("1,234.5").as_f64(), Some(1234.5));
        assert_eq!(Cell::text("abc").as_f64(), None);
    }
}
