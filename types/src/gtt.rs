//! GTT instruction sheet model and the matching rules applied to it.
//!
//! An instruction row names a ticker, a free-form trading type (`ST BUY`,
//! `RTP_SELL`, `TSL 5%`, ...), units, and a trigger price. Types are normalized
//! to a side before any comparison so that differently spelled types of the
//! same side collide.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, Row};

/// Instruction-sheet header names.
pub mod columns {
    pub const TICKER: &str = "TICKER";
    pub const TYPE: &str = "TYPE";
    pub const UNITS: &str = "UNITS";
    pub const GTT_PRICE: &str = "GTT PRICE";
    pub const LIVE_PRICE: &str = "LIVE PRICE";
    pub const TICK_SIZE: &str = "TICK SIZE";
    pub const ACTION: &str = "ACTION";
    pub const METHOD: &str = "METHOD";
    pub const GTT_DATE: &str = "GTT DATE";
    pub const STATUS: &str = "STATUS";
    /// Both spellings occur in data sheets.
    pub const GTT_ID: [&str; 2] = ["GTT_ID", "GTT ID"];
}

/// Data-sheet layout written for new rows.
pub const DATA_HEADER: [&str; 6] = ["TICKER", "TYPE", "UNITS", "GTT PRICE", "GTT DATE", "GTT_ID"];

/// Columns `A:E` are rewritten on update; the id in `F` stays.
pub const DATA_UPDATE_WIDTH: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Place,
    Update,
    Delete,
    Unknown,
}

impl ActionType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Place => "PLACE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionSide {
    Buy,
    Sell,
}

impl TransactionSide {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for TransactionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action keyword search over the uppercased cell. `INSERT` is an alias of `PLACE`.
#[must_use]
pub fn determine_action(raw: &str) -> ActionType {
    let raw = raw.trim().to_uppercase();
    if raw.is_empty() {
        ActionType::Unknown
    } else if raw.contains("INSERT") || raw.contains("PLACE") {
        ActionType::Place
    } else if raw.contains("UPDATE") {
        ActionType::Update
    } else if raw.contains("DELETE") {
        ActionType::Delete
    } else {
        ActionType::Unknown
    }
}

const BUY_KEYWORDS: [&str; 4] = [" BUY", "RTP_BUY", "KWK", "SIP_REG"];
const SELL_KEYWORDS: [&str; 2] = [" SELL", "RTP_SELL"];

/// Collapse a trading type to `BUY`/`SELL` when it carries a side keyword.
///
/// Keywords are searched in the raw (untrimmed, case-preserved) value, so
/// `" BUY"` only matches with its leading space. Types without a side come
/// back trimmed and uppercased.
#[must_use]
pub fn normalize_for_matching(raw: &str) -> String {
    if BUY_KEYWORDS.iter().any(|k| raw.contains(k)) {
        return "BUY".to_string();
    }
    if SELL_KEYWORDS.iter().any(|k| raw.contains(k)) {
        return "SELL".to_string();
    }
    let upper = raw.trim().to_uppercase();
    if upper.starts_with("TSL") {
        return "SELL".to_string();
    }
    upper
}

/// Float parse that strips thousands separators; garbage is `0.0`.
#[must_use]
pub fn parse_float_safe(raw: &str) -> f64 {
    raw.replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Integer parse that strips thousands separators; garbage is `0`.
#[must_use]
pub fn parse_int_safe(raw: &str) -> i64 {
    raw.replace(',', "").trim().parse::<i64>().unwrap_or(0)
}

/// One validated instruction row.
#[derive(Debug, Clone, PartialEq)]
pub struct GttInstruction {
    pub ticker: String,
    pub kind: String,
    pub units: i64,
    pub gtt_price: f64,
    pub live_price: f64,
    pub tick_size: f64,
    pub action: ActionType,
    pub method: String,
    pub gtt_date: String,
    pub row_number: u32,
}

impl GttInstruction {
    /// Exchange before the `:`, `NSE` when the ticker is bare.
    #[must_use]
    pub fn exchange(&self) -> &str {
        self.ticker
            .split_once(':')
            .map_or("NSE", |(exchange, _)| exchange.trim())
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        self.ticker
            .split_once(':')
            .map_or(self.ticker.trim(), |(_, symbol)| symbol.trim())
    }

    #[must_use]
    pub fn normalized_type(&self) -> String {
        normalize_for_matching(&self.kind)
    }

    #[must_use]
    pub fn side(&self) -> TransactionSide {
        if self.normalized_type() == "BUY" {
            TransactionSide::Buy
        } else {
            TransactionSide::Sell
        }
    }

    /// Limit price one tick through the trigger: above for buys, below for sells.
    #[must_use]
    pub fn limit_price(&self) -> f64 {
        match self.side() {
            TransactionSide::Buy => self.gtt_price + self.tick_size,
            TransactionSide::Sell => self.gtt_price - self.tick_size,
        }
    }

    /// Reason the instruction cannot be sent to the broker, if any.
    #[must_use]
    pub fn validate(&self) -> Option<&'static str> {
        if self.ticker.is_empty() {
            Some("Missing TICKER")
        } else if self.kind.is_empty() {
            Some("Missing TYPE")
        } else if self.action == ActionType::Unknown {
            Some("Unknown ACTION")
        } else if self.units <= 0 {
            Some("Invalid UNITS")
        } else if self.gtt_price <= 0.0 {
            Some("Invalid GTT PRICE")
        } else {
            None
        }
    }

    /// Same ticker, normalized type, units, and trigger price.
    #[must_use]
    pub fn matches_exact(&self, row: &GttDataRow) -> bool {
        self.matches_for_update(row) && self.units == row.units && self.gtt_price == row.gtt_price
    }

    /// Same ticker and normalized type.
    #[must_use]
    pub fn matches_for_update(&self, row: &GttDataRow) -> bool {
        self.ticker == row.ticker && self.normalized_type() == normalize_for_matching(&row.kind)
    }

    /// Whether the stored order differs in units or trigger price.
    #[must_use]
    pub fn should_update(&self, existing: &GttDataRow) -> bool {
        !(existing.units == self.units && existing.gtt_price == self.gtt_price)
    }

    /// Single-leg GTT: trigger at the sheet price, LIMIT/CNC leg at one tick through it.
    #[must_use]
    pub fn order_spec(&self) -> GttOrderSpec {
        GttOrderSpec {
            exchange: self.exchange().to_string(),
            symbol: self.symbol().to_string(),
            side: self.side(),
            quantity: self.units,
            trigger_price: self.gtt_price,
            last_price: self.live_price,
            limit_price: self.limit_price(),
            tag: (!self.method.is_empty()).then(|| self.method.clone()),
        }
    }

    /// Data-sheet row for a freshly placed order, in [`DATA_HEADER`] order.
    #[must_use]
    pub fn to_data_row(&self, gtt_id: &str) -> GttDataRow {
        GttDataRow {
            ticker: self.ticker.clone(),
            kind: self.kind.clone(),
            units: self.units,
            gtt_price: self.gtt_price,
            gtt_date: self.gtt_date.clone(),
            gtt_id: gtt_id.to_string(),
            row_number: 0,
        }
    }
}

/// Broker-facing description of a single-trigger GTT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GttOrderSpec {
    pub exchange: String,
    pub symbol: String,
    pub side: TransactionSide,
    pub quantity: i64,
    pub trigger_price: f64,
    pub last_price: f64,
    pub limit_price: f64,
    pub tag: Option<String>,
}

/// One row of the GTT data (tracking) sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct GttDataRow {
    pub ticker: String,
    pub kind: String,
    pub units: i64,
    pub gtt_price: f64,
    pub gtt_date: String,
    pub gtt_id: String,
    pub row_number: u32,
}

impl GttDataRow {
    /// Cells for `header`, blank for columns the row does not carry.
    #[must_use]
    pub fn to_cells(&self, header: &[String]) -> Row {
        header
            .iter()
            .map(|name| match name.trim() {
                "TICKER" => Cell::text(self.ticker.clone()),
                "TYPE" => Cell::text(self.kind.clone()),
                "UNITS" => Cell::from(self.units),
                "GTT PRICE" => Cell::number(self.gtt_price),
                "GTT DATE" => Cell::text(self.gtt_date.clone()),
                n if columns::GTT_ID.contains(&n) => Cell::text(self.gtt_id.clone()),
                _ => Cell::Empty,
            })
            .collect()
    }
}

/// Every status string the processor writes back to the instruction sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Placed,
    Updated,
    Deleted,
    DuplicateFound,
    NoUpdateNeeded,
    MissingField,
    NoGttIdUpdate,
    NoGttIdDelete,
    NoMatchFound,
    MultipleMatches,
    UnknownAction,
    Error(String),
    Exception(String),
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placed => f.write_str("✅ placed"),
            Self::Updated => f.write_str("✅ updated"),
            Self::Deleted => f.write_str("✅ deleted"),
            Self::DuplicateFound => f.write_str("⚠️ duplicate found"),
            Self::NoUpdateNeeded => f.write_str("no update needed"),
            Self::MissingField => f.write_str("❌ MISSING FIELD"),
            Self::NoGttIdUpdate => f.write_str("❌ no gtt_id to update"),
            Self::NoGttIdDelete => f.write_str("❌ no gtt_id to delete"),
            Self::NoMatchFound => f.write_str("❌ no match found"),
            Self::MultipleMatches => f.write_str("❌ conflict: multiple matches"),
            Self::UnknownAction => f.write_str("❌ unknown action"),
            Self::Error(msg) => write!(f, "❌ error: {msg}"),
            Self::Exception(msg) => write!(f, "❌ exception: {msg}"),
        }
    }
}

/// Append `status` to an existing status cell with ` | `.
#[must_use]
pub fn append_status(existing: &str, status: &StatusMessage) -> String {
    let existing = existing.trim();
    if existing.is_empty() {
        status.to_string()
    } else {
        format!("{existing} | {status}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruction(ticker: &str, kind: &str, units: i64, price: f64) -> GttInstruction {
        GttInstruction {
            ticker: ticker.into(),
            kind: kind.into(),
            units,
            gtt_price: price,
            live_price: price * 1.1,
            tick_size: 0.05,
            action: ActionType::Place,
            method: "ALGO".into(),
            gtt_date: "16-Jul-2025".into(),
            row_number: 2,
        }
    }

    fn data_row(ticker: &str, kind: &str, units: i64, price: f64, id: &str) -> GttDataRow {
        GttDataRow {
            ticker: ticker.into(),
            kind: kind.into(),
            units,
            gtt_price: price,
            gtt_date: String::new(),
            gtt_id: id.into(),
            row_number: 2,
        }
    }

    #[test]
    fn action_keywords() {
        assert_eq!(determine_action("insert new"), ActionType::Place);
        assert_eq!(determine_action(" Place "), ActionType::Place);
        assert_eq!(determine_action("UPDATE"), ActionType::Update);
        assert_eq!(determine_action("please delete"), ActionType::Delete);
        assert_eq!(determine_action("hold"), ActionType::Unknown);
        assert_eq!(determine_action("   "), ActionType::Unknown);
    }

    #[test]
    fn type_normalization() {
        assert_eq!(normalize_for_matching("ST BUY"), "BUY");
        assert_eq!(normalize_for_matching("RTP_BUY"), "BUY");
        assert_eq!(normalize_for_matching("KWK-2"), "BUY");
        assert_eq!(normalize_for_matching("SIP_REG"), "BUY");
        assert_eq!(normalize_for_matching("LT SELL"), "SELL");
        assert_eq!(normalize_for_matching("RTP_SELL"), "SELL");
        assert_eq!(normalize_for_matching(" tsl 5% "), "SELL");
        assert_eq!(normalize_for_matching("BUY"), "BUY");
        assert_eq!(normalize_for_matching(" swing "), "SWING");
    }

    #[test]
    fn lowercase_side_keywords_do_not_match() {
        assert_eq!(normalize_for_matching("st buy"), "ST BUY");
    }

    #[test]
    fn lenient_numbers() {
        assert_eq!(parse_float_safe(" 1,234.50 "), 1234.5);
        assert_eq!(parse_float_safe("abc"), 0.0);
        assert_eq!(parse_int_safe("1,000"), 1000);
        assert_eq!(parse_int_safe("10.5"), 0);
    }

    #[test]
    fn ticker_parts_and_limit_price() {
        let buy = instruction("BSE:INFY", "ST BUY", 10, 100.0);
        assert_eq!(buy.exchange(), "BSE");
        assert_eq!(buy.symbol(), "INFY");
        assert_eq!(buy.side(), TransactionSide::Buy);
        assert!((buy.limit_price() - 100.05).abs() < 1e-9);

        let sell = instruction("TCS", "LT SELL", 10, 100.0);
        assert_eq!(sell.exchange(), "NSE");
        assert_eq!(sell.symbol(), "TCS");
        assert!((sell.limit_price() - 99.95).abs() < 1e-9);
    }

    #[test]
    fn order_spec_carries_trigger_and_limit() {
        let mut i = instruction("NSE:TCS", "LT SELL", 3, 200.0);
        i.tick_size = 0.1;
        let spec = i.order_spec();
        assert_eq!(spec.side, TransactionSide::Sell);
        assert_eq!(spec.trigger_price, 200.0);
        assert!((spec.limit_price - 199.9).abs() < 1e-9);
        assert_eq!(spec.tag.as_deref(), Some("ALGO"));
        i.method.clear();
        assert_eq!(i.order_spec().tag, None);
    }

    #[test]
    fn validation_order() {
        let mut i = instruction("NSE:TCS", "ST BUY", 0, 100.0);
        i.action = ActionType::Unknown;
        assert_eq!(i.validate(), Some("Unknown ACTION"));
        i.action = ActionType::Place;
        assert_eq!(i.validate(), Some("Invalid UNITS"));
        i.units = 5;
        i.gtt_price = 0.0;
        assert_eq!(i.validate(), Some("Invalid GTT PRICE"));
        i.gtt_price = 1.0;
        assert_eq!(i.validate(), None);
    }

    #[test]
    fn matching_uses_normalized_types() {
        let i = instruction("NSE:TCS", "RTP_BUY", 10, 100.0);
        let same = data_row("NSE:TCS", "ST BUY", 10, 100.0, "1");
        let moved = data_row("NSE:TCS", "KWK", 12, 95.0, "2");
        let other_side = data_row("NSE:TCS", "LT SELL", 10, 100.0, "3");

        assert!(i.matches_exact(&same));
        assert!(!i.matches_exact(&moved));
        assert!(i.matches_for_update(&moved));
        assert!(!i.matches_for_update(&other_side));
    }

    #[test]
    fn update_compares_trigger_price() {
        let i = instruction("NSE:TCS", "ST BUY", 10, 100.0);
        assert!(!i.should_update(&data_row("NSE:TCS", "ST BUY", 10, 100.0, "1")));
        assert!(i.should_update(&data_row("NSE:TCS", "ST BUY", 10, 101.0, "1")));
        assert!(i.should_update(&data_row("NSE:TCS", "ST BUY", 11, 100.0, "1")));
    }

    #[test]
    fn data_row_cells_follow_header() {
        let row = instruction("NSE:TCS", "ST BUY", 10, 100.0).to_data_row("77");
        let header: Vec<String> = ["TICKER", "GTT ID", "NOTES", "UNITS"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            row.to_cells(&header),
            vec![
                Cell::text("NSE:TCS"),
                Cell::text("77"),
                Cell::Empty,
                Cell::Number(10.0),
            ]
        );
    }

    #[test]
    fn status_strings() {
        assert_eq!(StatusMessage::Placed.to_string(), "✅ placed");
        assert_eq!(
            StatusMessage::Error("boom".into()).to_string(),
            "❌ error: boom"
        );
        assert_eq!(
            append_status("✅ placed", &StatusMessage::DuplicateFound),
            "✅ placed | ⚠️ duplicate found"
        );
        assert_eq!(append_status("", &StatusMessage::Deleted), "✅ deleted");
    }
}
