//! Quote rows produced by the market-data fetchers.

use chrono::NaiveDate;

use crate::cell::{Cell, Row};
use crate::key::display_date;

/// Column order of the uploaded quote tab and CSV export.
pub const QUOTE_HEADER: [&str; 10] = [
    "Symbol",
    "Company_Name",
    "Current_Price",
    "Previous_Close",
    "Day_High",
    "Day_Low",
    "52_Week_High",
    "52_Week_Low",
    "Volume (in Cr.)",
    "Last_Updated",
];

/// Header columns rendered with two decimals.
pub const QUOTE_NUMBER_COLUMNS: [&str; 7] = [
    "Current_Price",
    "Previous_Close",
    "Day_High",
    "Day_Low",
    "52_Week_High",
    "52_Week_Low",
    "Volume (in Cr.)",
];

/// One equity snapshot. `symbol` keeps its `NSE:` prefix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Quote {
    pub symbol: String,
    pub company_name: String,
    pub current_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub day_high: Option<f64>,
    pub day_low: Option<f64>,
    pub week52_high: Option<f64>,
    pub week52_low: Option<f64>,
    pub volume: Option<f64>,
    pub last_updated: Option<NaiveDate>,
}

impl Quote {
    /// Traded value in crores: `volume * price / 1e7`.
    #[must_use]
    pub fn volume_crores(&self) -> Option<f64> {
        Some(self.volume? * self.current_price? / 1e7)
    }

    /// Cells in [`QUOTE_HEADER`] order.
    #[must_use]
    pub fn to_row(&self) -> Row {
        vec![
            Cell::text(self.symbol.clone()),
            Cell::text(self.company_name.clone()),
            Cell::from_option(self.current_price),
            Cell::from_option(self.previous_close),
            Cell::from_option(self.day_high),
            Cell::from_option(self.day_low),
            Cell::from_option(self.week52_high),
            Cell::from_option(self.week52_low),
            Cell::from_option(self.volume_crores()),
            self.last_updated
                .map_or(Cell::Empty, |d| Cell::text(display_date(d))),
        ]
    }
}
