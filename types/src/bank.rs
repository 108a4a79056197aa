//! Daily market-data ledger rows (BANK_INC / BANK_NEW / BANK_FINAL).

use crate::cell::{Cell, Row};

/// Column layout shared by every bank tab.
pub const BANK_HEADER: [&str; 7] = ["DATE", "SYMBOL", "CLOSE", "LOW", "HIGH", "VOLUME", "TYPE"];

/// Columns that carry market values and are subject to gap filling.
pub const VALUE_COLUMNS: [BankField; 4] = [
    BankField::Close,
    BankField::Low,
    BankField::High,
    BankField::Volume,
];

pub const BANK_WIDTH: u32 = BANK_HEADER.len() as u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankField {
    Close,
    Low,
    High,
    Volume,
}

impl BankField {
    /// Zero-based position within a bank row.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Close => 2,
            Self::Low => 3,
            Self::High => 4,
            Self::Volume => 5,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        BANK_HEADER[self.index()]
    }
}

/// Blank, missing, or numerically zero.
#[must_use]
pub fn zeroish(cell: &Cell) -> bool {
    match cell {
        Cell::Empty => true,
        Cell::Number(n) => *n == 0.0,
        Cell::Text(s) => {
            let s = s.trim();
            s.is_empty() || s.parse::<f64>().is_ok_and(|n| n == 0.0)
        }
        Cell::Bool(_) => false,
    }
}

/// Idempotent `NSE:` prefix, uppercased.
#[must_use]
pub fn nse_symbol(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper.starts_with("NSE:") {
        upper
    } else {
        format!("NSE:{upper}")
    }
}

/// Yahoo Finance symbol for an NSE listing (`NSE:RELIANCE -> RELIANCE.NS`).
#[must_use]
pub fn yahoo_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    let bare = upper.strip_prefix("NSE:").unwrap_or(&upper);
    format!("{bare}.NS")
}

/// A blank bank row of the right width.
#[must_use]
pub fn blank_bank_row() -> Row {
    vec![Cell::Empty; BANK_HEADER.len()]
}
