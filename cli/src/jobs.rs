//! Wiring from configuration to clients to the job engines in `tally-core`.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tally_config::{CellExpectation, TallyConfig};
use tally_core::checks::{self, CheckOutcome, DateRoll, RollStep, Rule};
use tally_core::quotes::{self, Market, QuotesError, QuotesOptions};
use tally_core::{
    EtlOptions, GttOptions, TeleportOptions, export_gtts, export_holdings, process_instructions,
    refresh_tick_sizes, replicate, run_bank_etl, run_quotes,
};
use tally_providers::kite::{KiteClient, KiteClientConfig};
use tally_providers::nse::NseClient;
use tally_providers::retry::RetryConfig;
use tally_providers::sheets::{SheetsClient, SheetsClientConfig, Spreadsheet};
use tally_providers::yahoo::YahooClient;
use tally_types::StatusMessage;

const MARKET_DATA_TIMEOUT: Duration = Duration::from_secs(30);

/// How a job ended when it did not error outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The job ran but a check or a row failed.
    Failed,
}

impl Outcome {
    fn from_passed(passed: bool) -> Self {
        if passed { Self::Success } else { Self::Failed }
    }
}

pub struct Jobs {
    config: TallyConfig,
    today: NaiveDate,
}

impl Jobs {
    pub fn new(config: TallyConfig, today: NaiveDate) -> Self {
        Self { config, today }
    }

    fn sheets(&self) -> Result<SheetsClient> {
        let google = &self.config.google;
        SheetsClient::new(SheetsClientConfig {
            base_url: google.base_url.clone(),
            access_token: google.access_token.clone().unwrap_or_default(),
            max_requests_per_minute: google.max_requests_per_minute,
            retry: RetryConfig::sheets(
                google.max_retries,
                Duration::from_millis(google.backoff_base_ms),
            ),
            timeout: Duration::from_secs(google.timeout_secs),
        })
        .context("set google.access_token in the config file")
    }

    fn open(&self, sheets: &SheetsClient, alias: &str) -> Spreadsheet {
        let id = self.config.spreadsheet(alias);
        tracing::debug!(alias, id = %id, "opening spreadsheet");
        sheets.spreadsheet(id)
    }

    fn kite(&self) -> Result<KiteClient> {
        let kite = &self.config.kite;
        KiteClient::new(KiteClientConfig {
            base_url: kite.base_url.clone(),
            api_key: kite.api_key.clone().unwrap_or_default(),
            access_token: kite.access_token.clone().unwrap_or_default(),
            timeout: Duration::from_secs(kite.timeout_secs),
        })
        .context("set kite.api_key and kite.access_token in the config file")
    }

    /// Evaluate expectations that name another spreadsheet, one open per alias.
    async fn remote_checks(
        &self,
        sheets: &SheetsClient,
        expectations: &[CellExpectation],
    ) -> Vec<CheckOutcome> {
        let mut by_alias: BTreeMap<&str, Vec<CellExpectation>> = BTreeMap::new();
        for expectation in expectations {
            if let Some(alias) = expectation.spreadsheet.as_deref() {
                by_alias.entry(alias).or_default().push(expectation.clone());
            }
        }
        let mut outcomes = Vec::new();
        for (alias, group) in by_alias {
            let sheet = self.open(sheets, alias);
            outcomes.extend(checks::expect_cells(&sheet, &group).await);
        }
        outcomes
    }

    pub async fn teleport(&self) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let teleport = &self.config.teleport;
        let source = self.open(&sheets, &teleport.source);
        let dest = self.open(&sheets, &teleport.dest);
        let report = replicate(&source, &dest, &TeleportOptions::from(teleport))
            .await
            .context("teleport failed")?;
        println!(
            "teleport: {} keys, {} missing, {} overwritten, {} appended, {} duplicates deleted, \
             {} sampled, {} mismatches",
            report.keys_read,
            report.missing_keys,
            report.overwrites,
            report.appends,
            report.duplicates_deleted,
            report.verified,
            report.verification_mismatches,
        );
        Ok(Outcome::from_passed(report.verification_mismatches == 0))
    }

    pub async fn bank_etl(&self) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let etl = &self.config.bank_etl;
        let source = self.open(&sheets, &etl.source);
        let dest = self.open(&sheets, &etl.dest);
        let mut report = run_bank_etl(&source, &dest, &EtlOptions::from(etl))
            .await
            .context("bank ETL failed")?;
        report
            .checks
            .extend(self.remote_checks(&sheets, &etl.post_checks).await);
        println!(
            "bank-etl: {} INC rows, {} overwritten, {} appended, {} zero values ({} filled)",
            report.inc_rows,
            report.overwrites,
            report.appends,
            report.zero_values,
            report.filled_values,
        );
        print_checks(&report.checks);
        Ok(Outcome::from_passed(report.checks_passed()))
    }

    pub async fn gtt(&self) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let kite = self.kite()?;
        let gtt = &self.config.gtt;
        let sheet = self.open(&sheets, &gtt.spreadsheet);
        let result = process_instructions(&sheet, &sheet, &kite, &GttOptions::from(gtt))
            .await
            .context("GTT processing failed")?;
        println!(
            "gtt: {} processed, {} placed, {} updated, {} deleted, {} failed, {} conflicts",
            result.total_processed,
            result.count(&StatusMessage::Placed),
            result.count(&StatusMessage::Updated),
            result.count(&StatusMessage::Deleted),
            result.failed_rows.len(),
            result.conflict_rows.len(),
        );
        for failed in &result.failed_rows {
            println!("  row {}: {}", failed.row_number, failed.reason);
        }
        Ok(Outcome::from_passed(result.failed_rows.is_empty()))
    }

    pub async fn tick_size(&self) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let kite = self.kite()?;
        let config = &self.config.tick_size;
        let sheet = self.open(&sheets, &config.spreadsheet);
        let report = refresh_tick_sizes(&sheet, &kite, &config.tab)
            .await
            .context("tick size refresh failed")?;
        println!(
            "tick-size: {} rows, {} resolved, {} via alternate, {} unresolved",
            report.rows,
            report.resolved,
            report.via_alternate,
            report.unresolved.len(),
        );
        Ok(Outcome::Success)
    }

    async fn symbols(&self, market: Market) -> Result<Vec<String>> {
        let config = &self.config.quotes;
        let file = match market {
            Market::Stock => config.stock_ticker_file.as_deref(),
            Market::Etf => config.etf_ticker_file.as_deref(),
        };
        match (file, market) {
            (Some(path), _) => Ok(quotes::read_ticker_file(path)?),
            (None, Market::Etf) => Err(QuotesError::MissingTickerFile.into()),
            (None, Market::Stock) => {
                let nse = NseClient::new(&config.nse_list_url, MARKET_DATA_TIMEOUT)?;
                let raw = nse
                    .equity_symbols()
                    .await
                    .context("failed to download the NSE equity list")?;
                Ok(quotes::normalize_symbols(raw))
            }
        }
    }

    pub async fn quotes(&self, market: Market) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let config = &self.config.quotes;
        let symbols = self.symbols(market).await?;
        if symbols.is_empty() {
            bail!("no {} symbols to fetch", market.as_str());
        }
        let yahoo = YahooClient::new(&config.yahoo_base_url, MARKET_DATA_TIMEOUT)?;
        let sheet = self.open(&sheets, &config.spreadsheet);
        let options = QuotesOptions::from_config(config, market);
        let report = run_quotes(&yahoo, &sheet, &symbols, &options, self.today)
            .await
            .with_context(|| format!("{} quotes failed", market.as_str()))?;
        println!(
            "quotes {}: {}/{} fetched, {} failed, {} upload batches (final size {})",
            market.as_str(),
            report.quotes.len(),
            report.requested,
            report.failed.len(),
            report.upload_batches,
            report.final_batch_size,
        );
        Ok(Outcome::Success)
    }

    pub async fn export_gtts(&self) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let kite = self.kite()?;
        let config = &self.config.snapshots;
        let sheet = self.open(&sheets, &config.spreadsheet);
        let report = export_gtts(&sheet, &kite, &config.gtt_tab)
            .await
            .context("GTT export failed")?;
        println!("export-gtts: {} rows", report.rows);
        Ok(Outcome::Success)
    }

    pub async fn export_holdings(&self) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let kite = self.kite()?;
        let config = &self.config.snapshots;
        let sheet = self.open(&sheets, &config.spreadsheet);
        let local: Vec<CellExpectation> = config
            .holdings_checks
            .iter()
            .filter(|c| c.spreadsheet.is_none())
            .cloned()
            .collect();
        let mut report = export_holdings(&sheet, &kite, &config.holdings_tab, &local)
            .await
            .context("holdings export failed")?;
        report
            .checks
            .extend(self.remote_checks(&sheets, &config.holdings_checks).await);
        println!("export-holdings: {} rows", report.rows);
        print_checks(&report.checks);
        Ok(Outcome::from_passed(report.checks.iter().all(|c| c.passed)))
    }

    pub async fn check(&self, name: Option<&str>) -> Result<Outcome> {
        let selected: Vec<_> = self
            .config
            .checks
            .iter()
            .filter(|c| name.is_none() || c.name.as_deref() == name)
            .collect();
        if selected.is_empty() {
            bail!("no [[checks]] entry matches {}", name.unwrap_or("(any)"));
        }
        let sheets = self.sheets()?;
        let mut outcomes = Vec::with_capacity(selected.len());
        for check in selected {
            let sheet = self.open(&sheets, &check.spreadsheet);
            let label = check
                .name
                .clone()
                .unwrap_or_else(|| format!("{}!{}", check.tab, check.cell));
            outcomes.push(
                checks::check_cell(&sheet, &label, &check.tab, &check.cell, &Rule::from_config(check))
                    .await,
            );
        }
        print_checks(&outcomes);
        Ok(Outcome::from_passed(outcomes.iter().all(|c| c.passed)))
    }

    pub async fn trigger(&self) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let flag = &self.config.flag;
        let sheet = self.open(&sheets, &flag.spreadsheet);
        let value = checks::read_flag(&sheet, &flag.tab, &flag.cell).await;
        println!("{}", if value { "TRUE" } else { "FALSE" });
        Ok(Outcome::from_passed(value))
    }

    pub async fn set_flag(&self, value: bool) -> Result<Outcome> {
        let sheets = self.sheets()?;
        let flag = &self.config.flag;
        let sheet = self.open(&sheets, &flag.spreadsheet);
        checks::set_flag(&sheet, &flag.tab, &flag.cell, value)
            .await
            .context("failed to write the flag cell")?;
        Ok(Outcome::Success)
    }

    pub async fn date_roll(&self, name: Option<&str>) -> Result<Outcome> {
        let selected: Vec<_> = self
            .config
            .date_rolls
            .iter()
            .filter(|r| name.is_none() || r.name.as_deref() == name)
            .collect();
        if selected.is_empty() {
            bail!("no [[date_rolls]] entry matches {}", name.unwrap_or("(any)"));
        }
        let sheets = self.sheets()?;
        let flag = &self.config.flag;
        let flag_sheet = self.open(&sheets, &flag.spreadsheet);
        let mut passed = true;
        for roll in selected {
            let sheet = self.open(&sheets, &roll.spreadsheet);
            let spec = DateRoll {
                source_tab: roll.source_tab.clone(),
                source_cell: roll.source_cell.clone(),
                dest_tab: roll
                    .dest_tab
                    .clone()
                    .unwrap_or_else(|| roll.source_tab.clone()),
                dest_cell: roll.dest_cell.clone(),
            };
            let outcome =
                checks::roll_date(&sheet, &spec, &flag_sheet, &flag.tab, &flag.cell, self.today)
                    .await
                    .context("failed to write the flag cell")?;
            let label = roll.name.as_deref().unwrap_or(&roll.source_tab);
            match &outcome.step {
                RollStep::Copied(value) => {
                    println!("{label}: copied {value} (changed: {})", outcome.changed);
                }
                RollStep::NotDue(date) => println!("{label}: {date} is not due"),
                RollStep::Unparsable(value) => {
                    println!("{label}: `{value}` is not a DD-Mon-YYYY date");
                }
                RollStep::Failed(reason) => {
                    passed = false;
                    println!("{label}: failed: {reason}");
                }
            }
        }
        Ok(Outcome::from_passed(passed))
    }
}

fn print_checks(outcomes: &[CheckOutcome]) {
    for outcome in outcomes {
        let mark = if outcome.passed { "PASS" } else { "FAIL" };
        println!(
            "  {mark} {} = {:?} ({})",
            outcome.label, outcome.value, outcome.detail
        );
    }
}
