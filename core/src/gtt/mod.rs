//! GTT instruction processing.
//!
//! Instructions are read in batches from the instruction tab and reconciled
//! against the data tab ledger: PLACE creates a trigger, UPDATE modifies the one
//! trigger of the same ticker and side, DELETE removes an exact match. Every
//! processed row gets a status appended to its `STATUS` cell.

mod ledger;

pub use ledger::DataLedger;

use tally_config::GttConfig;
use tally_types::gtt::{DATA_UPDATE_WIDTH, append_status, columns, parse_float_safe, parse_int_safe};
use tally_types::{
    A1Range, ActionType, Cell, GttInstruction, Row, RowSpan, StatusMessage, ValueInput,
    ValueRender, determine_action,
};

use crate::ports::{GttBroker, SheetError, SheetStore};
use crate::records::Records;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GttOptions {
    pub instructions_tab: String,
    pub data_tab: String,
    pub batch_size: u32,
    /// First instruction row, 1-based.
    pub start_row: u32,
}

impl From<&GttConfig> for GttOptions {
    fn from(config: &GttConfig) -> Self {
        Self {
            instructions_tab: config.instructions_tab.clone(),
            data_tab: config.data_tab.clone(),
            batch_size: config.batch_size.max(1),
            start_row: config.start_row.max(2),
        }
    }
}

impl Default for GttOptions {
    fn default() -> Self {
        Self::from(&GttConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRow {
    pub row_number: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingResult {
    pub total_processed: usize,
    pub failed_rows: Vec<FailedRow>,
    pub conflict_rows: Vec<u32>,
    /// Status written per instruction row, in processing order.
    pub statuses: Vec<(u32, StatusMessage)>,
}

impl ProcessingResult {
    #[must_use]
    pub fn count(&self, status: &StatusMessage) -> usize {
        self.statuses.iter().filter(|(_, s)| s == status).count()
    }
}

/// Instruction-tab header plus the lazily created status column.
struct InstructionSheet<'a, S> {
    store: &'a S,
    tab: &'a str,
    header: Records,
    status_col: Option<u32>,
}

impl<'a, S: SheetStore> InstructionSheet<'a, S> {
    async fn open(store: &'a S, tab: &'a str) -> Result<Self, SheetError> {
        let header_rows = store
            .get(
                tab,
                &A1Range::full_rows(RowSpan::single(1)),
                ValueRender::Formatted,
            )
            .await?;
        let header = Records::from_rows(header_rows);
        let status_col = header.column(columns::STATUS).map(|i| i as u32 + 1);
        Ok(Self {
            store,
            tab,
            header,
            status_col,
        })
    }

    async fn batch(&self, start: u32, size: u32) -> Result<Vec<Row>, SheetError> {
        self.store
            .get(
                self.tab,
                &A1Range::full_rows(RowSpan::new(start, start + size - 1)),
                ValueRender::Formatted,
            )
            .await
    }

    fn parse(&self, row: &[Cell], row_number: u32) -> Option<GttInstruction> {
        let text = |name: &str| self.header.text(row, name);
        let ticker = text(columns::TICKER);
        let kind = text(columns::TYPE);
        let action = text(columns::ACTION);
        if ticker.is_empty() || kind.is_empty() || action.is_empty() {
            return None;
        }
        Some(GttInstruction {
            ticker,
            kind,
            units: parse_int_safe(&text(columns::UNITS)),
            gtt_price: parse_float_safe(&text(columns::GTT_PRICE)),
            live_price: parse_float_safe(&text(columns::LIVE_PRICE)),
            tick_size: parse_float_safe(&text(columns::TICK_SIZE)),
            action: determine_action(&action),
            method: text(columns::METHOD),
            gtt_date: text(columns::GTT_DATE),
            row_number,
        })
    }

    async fn status_column(&mut self) -> Result<u32, SheetError> {
        if let Some(col) = self.status_col {
            return Ok(col);
        }
        let col = self.header.header().len() as u32 + 1;
        self.store
            .update(
                self.tab,
                &A1Range::cell(col, 1),
                &[vec![Cell::text(columns::STATUS)]],
                ValueInput::UserEntered,
            )
            .await?;
        tracing::info!(tab = self.tab, col, "created STATUS column");
        self.status_col = Some(col);
        Ok(col)
    }

    /// Append `status` to the row's existing status. Failures are logged.
    async fn write_status(&mut self, row: &[Cell], row_number: u32, status: &StatusMessage) {
        let existing = self
            .status_col
            .map(|col| tally_types::cell_text(row, col as usize - 1))
            .unwrap_or_default();
        let result = async {
            let col = self.status_column().await?;
            self.store
                .update(
                    self.tab,
                    &A1Range::cell(col, row_number),
                    &[vec![Cell::text(append_status(&existing, status))]],
                    ValueInput::UserEntered,
                )
                .await
        }
        .await;
        if let Err(err) = result {
            tracing::error!(row = row_number, error = %err, "failed to write status");
        }
    }
}

/// Data-tab writes after a successful broker call. Failures are logged only.
struct DataSheet<'a, D> {
    store: &'a D,
    tab: &'a str,
    ledger: DataLedger,
}

impl<D: SheetStore> DataSheet<'_, D> {
    /// Write the default header to row 1 of a tab that has none.
    async fn ensure_header(&mut self) -> Result<(), SheetError> {
        if self.ledger.header_on_sheet() {
            return Ok(());
        }
        let header: Row = self.ledger.header().iter().map(Cell::text).collect();
        self.store
            .update(
                self.tab,
                &A1Range::rows(1, header.len() as u32, RowSpan::single(1)),
                &[header],
                ValueInput::UserEntered,
            )
            .await?;
        tracing::info!(tab = self.tab, "wrote data sheet header");
        self.ledger.mark_header_written();
        Ok(())
    }

    async fn record_placed(&mut self, instruction: &GttInstruction, gtt_id: &str) {
        let mut row = instruction.to_data_row(gtt_id);
        if let Err(err) = self.ensure_header().await {
            tracing::error!(gtt_id, error = %err, "failed to write data sheet header");
            self.ledger.push(row);
            return;
        }
        let cells = row.to_cells(self.ledger.header());
        match self
            .store
            .append(self.tab, &[cells], ValueInput::UserEntered)
            .await
        {
            Ok(span) => {
                row.row_number = span.map_or_else(|| self.ledger.next_row(), |s| s.start);
            }
            Err(err) => {
                tracing::error!(gtt_id, error = %err, "failed to add GTT to data sheet");
            }
        }
        self.ledger.push(row);
    }

    async fn record_updated(&mut self, gtt_id: &str, instruction: &GttInstruction) {
        self.ledger.apply_update(gtt_id, instruction);
        let Some(row_number) = self.ledger.row_of(gtt_id) else {
            tracing::warn!(gtt_id, "no data sheet row to update");
            return;
        };
        let header = self.ledger.header();
        let width = (DATA_UPDATE_WIDTH as usize).min(header.len());
        let cells = instruction.to_data_row(gtt_id).to_cells(&header[..width]);
        if let Err(err) = self
            .store
            .update(
                self.tab,
                &A1Range::rows(1, DATA_UPDATE_WIDTH, RowSpan::single(row_number)),
                &[cells],
                ValueInput::UserEntered,
            )
            .await
        {
            tracing::error!(gtt_id, row = row_number, error = %err, "failed to update data sheet row");
        }
    }

    async fn record_deleted(&mut self, gtt_id: &str) {
        let row_number = self.ledger.row_of(gtt_id);
        let removed = match row_number {
            Some(row) => match self.store.delete_rows(self.tab, RowSpan::single(row)).await {
                Ok(()) => Some(row),
                Err(err) => {
                    tracing::error!(gtt_id, row, error = %err, "failed to delete data sheet row");
                    None
                }
            },
            None => {
                tracing::warn!(gtt_id, "no data sheet row to delete");
                None
            }
        };
        self.ledger.remove(gtt_id, removed);
    }
}

enum Outcome {
    Status(StatusMessage),
    BrokerFailure(String),
}

async fn handle<B: GttBroker, D: SheetStore>(
    instruction: &GttInstruction,
    data: &mut DataSheet<'_, D>,
    broker: &B,
) -> Outcome {
    if instruction.action == ActionType::Unknown {
        return Outcome::Status(StatusMessage::UnknownAction);
    }
    if let Some(reason) = instruction.validate() {
        tracing::warn!(row = instruction.row_number, reason, "invalid instruction");
        return Outcome::Status(StatusMessage::MissingField);
    }
    let spec = instruction.order_spec();

    match instruction.action {
        ActionType::Place => {
            if !data.ledger.exact_matches(instruction).is_empty() {
                return Outcome::Status(StatusMessage::DuplicateFound);
            }
            match broker.place_gtt(&spec).await {
                Ok(gtt_id) => {
                    tracing::info!(row = instruction.row_number, gtt_id = %gtt_id, ticker = %instruction.ticker, "GTT placed");
                    data.record_placed(instruction, &gtt_id).await;
                    Outcome::Status(StatusMessage::Placed)
                }
                Err(err) => Outcome::BrokerFailure(err.to_string()),
            }
        }
        ActionType::Update => {
            let matches = data.ledger.update_matches(instruction);
            let existing = match matches.as_slice() {
                [] => return Outcome::Status(StatusMessage::NoMatchFound),
                [one] => (*one).clone(),
                _ => return Outcome::Status(StatusMessage::MultipleMatches),
            };
            if existing.gtt_id.is_empty() {
                return Outcome::Status(StatusMessage::NoGttIdUpdate);
            }
            if !instruction.should_update(&existing) {
                return Outcome::Status(StatusMessage::NoUpdateNeeded);
            }
            match broker.modify_gtt(&existing.gtt_id, &spec).await {
                Ok(()) => {
                    tracing::info!(row = instruction.row_number, gtt_id = %existing.gtt_id, "GTT updated");
                    data.record_updated(&existing.gtt_id, instruction).await;
                    Outcome::Status(StatusMessage::Updated)
                }
                Err(err) => Outcome::BrokerFailure(err.to_string()),
            }
        }
        ActionType::Delete => {
            let matches = data.ledger.exact_matches(instruction);
            let existing = match matches.as_slice() {
                [] => return Outcome::Status(StatusMessage::NoMatchFound),
                [one] => (*one).clone(),
                _ => return Outcome::Status(StatusMessage::MultipleMatches),
            };
            if existing.gtt_id.is_empty() {
                return Outcome::Status(StatusMessage::NoGttIdDelete);
            }
            match broker.delete_gtt(&existing.gtt_id).await {
                Ok(()) => {
                    tracing::info!(row = instruction.row_number, gtt_id = %existing.gtt_id, "GTT deleted");
                    data.record_deleted(&existing.gtt_id).await;
                    Outcome::Status(StatusMessage::Deleted)
                }
                Err(err) => Outcome::BrokerFailure(err.to_string()),
            }
        }
        ActionType::Unknown => Outcome::Status(StatusMessage::UnknownAction),
    }
}

/// Process every instruction row from `options.start_row` down.
///
/// Only reading the tabs is fatal. Broker failures are recorded per row and
/// processing continues with the next instruction.
pub async fn process_instructions<I, D, B>(
    instructions: &I,
    data: &D,
    broker: &B,
    options: &GttOptions,
) -> Result<ProcessingResult, SheetError>
where
    I: SheetStore,
    D: SheetStore,
    B: GttBroker,
{
    let mut sheet = InstructionSheet::open(instructions, &options.instructions_tab).await?;
    let mut data = DataSheet {
        store: data,
        tab: &options.data_tab,
        ledger: DataLedger::load(data, &options.data_tab).await?,
    };
    let mut result = ProcessingResult::default();
    let batch_size = options.batch_size.max(1);
    let mut start = options.start_row.max(2);

    loop {
        let rows = sheet.batch(start, batch_size).await?;
        if rows.is_empty() {
            break;
        }
        tracing::debug!(start, rows = rows.len(), "instruction batch");
        for (offset, row) in rows.iter().enumerate() {
            let row_number = start + offset as u32;
            if row.iter().all(Cell::is_blank) {
                continue;
            }
            let Some(instruction) = sheet.parse(row, row_number) else {
                result.failed_rows.push(FailedRow {
                    row_number,
                    reason: "Failed to parse instruction".to_string(),
                });
                continue;
            };
            result.total_processed += 1;

            let status = match handle(&instruction, &mut data, broker).await {
                Outcome::Status(status) => status,
                Outcome::BrokerFailure(message) => {
                    tracing::error!(row = row_number, ticker = %instruction.ticker, error = %message, "broker call failed");
                    result.failed_rows.push(FailedRow {
                        row_number,
                        reason: message.clone(),
                    });
                    StatusMessage::Error(message)
                }
            };
            if status == StatusMessage::MultipleMatches {
                result.conflict_rows.push(row_number);
            }
            sheet.write_status(row, row_number, &status).await;
            result.statuses.push((row_number, status));
        }
        start += rows.len() as u32;
    }

    tracing::info!(
        processed = result.total_processed,
        failed = result.failed_rows.len(),
        conflicts = result.conflict_rows.len(),
        "GTT instructions processed"
    );
    Ok(result)
}
