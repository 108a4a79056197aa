//! CSV reading and writing for broker dumps, NSE lists, and exports.

use csv::{ReaderBuilder, Trim, Writer};

pub use csv::Error as CsvError;

/// A parsed CSV document with a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parse text whose first record is the header. Fields are trimmed, ragged
    /// records are accepted, and records with no content are dropped.
    pub fn parse(text: &str) -> Result<Self, CsvError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.as_bytes());

        let header = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { header, rows })
    }

    /// Index of the first header matching `name` case-insensitively.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    /// Values of a column. Short rows yield empty strings.
    #[must_use]
    pub fn column_values(&self, idx: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|r| r.get(idx).cloned().unwrap_or_default())
            .collect()
    }
}

/// Render a header plus rows.
pub fn write_csv<H, S>(header: &[H], rows: &[Vec<S>]) -> Result<Vec<u8>, CsvError>
where
    H: AsRef<[u8]>,
    S: AsRef<[u8]>,
{
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| CsvError::from(e.into_error()))
}
