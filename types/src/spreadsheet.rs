use std::fmt;

use serde::{Deserialize, Serialize};

/// A Google spreadsheet key, extracted from a share URL or given bare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpreadsheetId(String);

impl SpreadsheetId {
    /// Accepts `https://docs.google.com/spreadsheets/d/<id>/edit...` or `<id>`.
    #[must_use]
    pub fn parse(url_or_id: &str) -> Self {
        let raw = url_or_id.trim();
        let id = raw
            .split_once("/d/")
            .map_or(raw, |(_, rest)| rest.split(['/', '?', '#']).next().unwrap_or(rest));
        Self(id.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpreadsheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
