//! In-memory copy of the GTT data tab.
//!
//! Loaded once per run and kept in step with every sheet write so that later
//! instructions see the effects of earlier ones.

use tally_types::gtt::{DATA_HEADER, columns, parse_float_safe, parse_int_safe};
use tally_types::{GttDataRow, GttInstruction, ValueRender};

use crate::ports::{SheetError, SheetStore};
use crate::records::Records;

#[derive(Debug, Clone, Default)]
pub struct DataLedger {
    header: Vec<String>,
    header_on_sheet: bool,
    rows: Vec<GttDataRow>,
}

impl DataLedger {
    /// Build from the records of the data tab. A tab without a header row uses
    /// the default layout, which must be written before the first append.
    #[must_use]
    pub fn from_records(records: &Records) -> Self {
        let header_on_sheet = records.header().iter().any(|h| !h.trim().is_empty());
        let header = if header_on_sheet {
            records.header().to_vec()
        } else {
            DATA_HEADER.iter().map(ToString::to_string).collect()
        };
        let id_col = records.column_any(&columns::GTT_ID);
        let rows = records
            .iter()
            .filter(|(_, row)| row.iter().any(|c| !c.is_blank()))
            .map(|(row_number, row)| GttDataRow {
                ticker: records.text(row, columns::TICKER),
                kind: records.text(row, columns::TYPE),
                units: parse_int_safe(&records.text(row, columns::UNITS)),
                gtt_price: parse_float_safe(&records.text(row, columns::GTT_PRICE)),
                gtt_date: records.text(row, columns::GTT_DATE),
                gtt_id: id_col
                    .map(|idx| tally_types::cell_text(row, idx))
                    .unwrap_or_default(),
                row_number,
            })
            .collect();
        Self {
            header,
            header_on_sheet,
            rows,
        }
    }

    pub async fn load<S: SheetStore>(store: &S, tab: &str) -> Result<Self, SheetError> {
        let records = Records::load(store, tab, ValueRender::Formatted).await?;
        let ledger = Self::from_records(&records);
        tracing::debug!(tab, rows = ledger.rows.len(), "data ledger loaded");
        Ok(ledger)
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Whether row 1 of the tab already holds the header.
    #[must_use]
    pub fn header_on_sheet(&self) -> bool {
        self.header_on_sheet
    }

    pub fn mark_header_written(&mut self) {
        self.header_on_sheet = true;
    }

    #[must_use]
    pub fn rows(&self) -> &[GttDataRow] {
        &self.rows
    }

    #[must_use]
    pub fn exact_matches(&self, instruction: &GttInstruction) -> Vec<&GttDataRow> {
        self.rows
            .iter()
            .filter(|r| instruction.matches_exact(r))
            .collect()
    }

    #[must_use]
    pub fn update_matches(&self, instruction: &GttInstruction) -> Vec<&GttDataRow> {
        self.rows
            .iter()
            .filter(|r| instruction.matches_for_update(r))
            .collect()
    }

    /// Sheet row holding `gtt_id`. Rows that never reached the sheet have row 0.
    #[must_use]
    pub fn row_of(&self, gtt_id: &str) -> Option<u32> {
        let gtt_id = gtt_id.trim();
        self.rows
            .iter()
            .find(|r| r.gtt_id.trim() == gtt_id)
            .map(|r| r.row_number)
            .filter(|n| *n > 0)
    }

    /// Next sheet row below the ledger, for backends that do not report appends.
    #[must_use]
    pub fn next_row(&self) -> u32 {
        self.rows.iter().map(|r| r.row_number).max().unwrap_or(1) + 1
    }

    pub fn push(&mut self, row: GttDataRow) {
        self.rows.push(row);
    }

    /// Apply an instruction's fields to the row holding `gtt_id`.
    pub fn apply_update(&mut self, gtt_id: &str, instruction: &GttInstruction) {
        if let Some(row) = self.rows.iter_mut().find(|r| r.gtt_id == gtt_id) {
            row.ticker.clone_from(&instruction.ticker);
            row.kind.clone_from(&instruction.kind);
            row.units = instruction.units;
            row.gtt_price = instruction.gtt_price;
            row.gtt_date.clone_from(&instruction.gtt_date);
        }
    }

    /// Drop `gtt_id` and shift every row below `removed_row` up by one.
    pub fn remove(&mut self, gtt_id: &str, removed_row: Option<u32>) {
        self.rows.retain(|r| r.gtt_id != gtt_id);
        if let Some(removed) = removed_row {
            for row in &mut self.rows {
                if row.row_number > removed {
                    row.row_number -= 1;
                }
            }
        }
    }
}
