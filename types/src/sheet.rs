//! Vocabulary shared by every sheet store: render and input options, number
//! formats, and tab-qualified ranges.

use serde::{Deserialize, Serialize};

use crate::a1::A1Range;

/// How cell values come back from a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueRender {
    /// What the user sees, as strings.
    #[default]
    Formatted,
    /// Raw numbers and booleans.
    Unformatted,
    /// Formulas instead of their results.
    Formula,
}

impl ValueRender {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Formatted => "FORMATTED_VALUE",
            Self::Unformatted => "UNFORMATTED_VALUE",
            Self::Formula => "FORMULA",
        }
    }
}

/// How written values are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValueInput {
    /// Parsed as if typed: formulas evaluate, dates become dates.
    #[default]
    UserEntered,
    Raw,
}

impl ValueInput {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserEntered => "USER_ENTERED",
            Self::Raw => "RAW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NumberFormatKind {
    Number,
    Date,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberFormat {
    #[serde(rename = "type")]
    pub kind: NumberFormatKind,
    pub pattern: String,
}

impl NumberFormat {
    /// Two decimals.
    #[must_use]
    pub fn decimal2() -> Self {
        Self {
            kind: NumberFormatKind::Number,
            pattern: "0.00".to_string(),
        }
    }

    /// `16-Jul-2025`.
    #[must_use]
    pub fn ledger_date() -> Self {
        Self {
            kind: NumberFormatKind::Date,
            pattern: "dd-mmm-yyyy".to_string(),
        }
    }
}

/// `'BANK NEW'!A2:G10`, or just the quoted tab for a whole-tab range.
#[must_use]
pub fn qualified_range(tab: &str, range: &A1Range) -> String {
    let quoted = format!("'{}'", tab.replace('\'', "''"));
    if range.is_whole() {
        quoted
    } else {
        format!("{quoted}!{range}")
    }
}
