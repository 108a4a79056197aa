//! Shared infrastructure utilities for tally.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`table`**: CSV parsing and rendering on the `csv` crate

pub mod atomic_write;
pub mod table;

pub use atomic_write::{FileSyncPolicy, atomic_write, atomic_write_with_policy};
pub use table::{CsvError, CsvTable, write_csv};
