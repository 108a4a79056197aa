//! Job engines for the tally spreadsheet ledger.
//!
//! Each job is generic over the ports in [`ports`], so the same code runs
//! against live Google Sheets and Kite clients or against [`MemorySheets`].

#![allow(clippy::float_cmp)]

pub mod bank_etl;
pub mod checks;
pub mod gtt;
pub mod memory;
pub mod ports;
pub mod quotes;
pub mod records;
pub mod snapshot;
pub mod teleport;
pub mod tick_size;

pub use bank_etl::{EtlError, EtlOptions, EtlReport, run_bank_etl};
pub use checks::{CheckOutcome, DateRoll, DateRollOutcome, RollStep, Rule};
pub use gtt::{GttOptions, ProcessingResult, process_instructions};
pub use memory::MemorySheets;
pub use ports::{BrokerError, BrokerReader, GttBroker, QuoteSource, SheetError, SheetStore};
pub use quotes::{Market, QuotesError, QuotesOptions, QuotesReport, run_quotes};
pub use records::Records;
pub use snapshot::{SnapshotError, SnapshotReport, export_gtts, export_holdings};
pub use teleport::{ScanMode, TeleportOptions, TeleportReport, replicate};
pub use tick_size::{TickSizeError, TickSizeReport, refresh_tick_sizes};
