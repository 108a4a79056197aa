//! Core domain types for tally.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Sheet cells and A1 ranges, ledger keys, bank rows, quotes, and the GTT
//! instruction model all live here so that every job engine speaks the same types.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::float_cmp)] // Ledger prices are compared exactly as the sheet stores them

pub mod a1;
pub mod bank;
pub mod cell;
pub mod gtt;
pub mod key;
pub mod market;
pub mod sheet;
mod spreadsheet;

pub use a1::{
    A1ParseError, A1Range, RowSpan, column_index, column_letter, contiguous_runs,
    group_contiguous, merge_spans,
};
pub use bank::{BANK_HEADER, BANK_WIDTH, BankField, VALUE_COLUMNS, nse_symbol, yahoo_symbol, zeroish};
pub use cell::{Cell, Row, cell_text, fit_row, rows_equal};
pub use gtt::{
    ActionType, GttDataRow, GttInstruction, GttOrderSpec, StatusMessage, TransactionSide,
    determine_action, normalize_for_matching,
};
pub use key::{RowKey, is_header_like, parse_date, parse_date_formula};
pub use market::Quote;
pub use sheet::{NumberFormat, NumberFormatKind, ValueInput, ValueRender, qualified_range};
pub use spreadsheet::SpreadsheetId;
