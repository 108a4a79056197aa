//! tally CLI - runs one spreadsheet ledger or broker job per invocation.
//!
//! ```text
//! tally <command> [args]
//!
//!   teleport              replicate BANK_NEW rows named in BANK_INC to BANK_FINAL
//!   bank-etl              load today's quotes into BANK_INC and BANK_NEW
//!   gtt                   apply the GTT instruction sheet to the broker
//!   tick-size             refresh tick sizes from the broker instrument list
//!   quotes <stock|etf>    fetch quotes and upload the market-data tab
//!   export-gtts           write every broker GTT to the snapshot tab
//!   export-holdings       write every holding to the snapshot tab
//!   check [name]          evaluate the configured cell checks
//!   trigger               exit 0 when the trigger flag cell is TRUE
//!   set-flag <true|false> write the trigger flag cell
//!   date-roll [name]      roll configured date cells forward
//! ```
//!
//! Configuration comes from `$TALLY_CONFIG` or `~/.tally/config.toml`.

mod jobs;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use tally_config::TallyConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::jobs::{Jobs, Outcome};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Teleport,
    BankEtl,
    Gtt,
    TickSize,
    Quotes(tally_core::Market),
    ExportGtts,
    ExportHoldings,
    Check(Option<String>),
    Trigger,
    SetFlag(bool),
    DateRoll(Option<String>),
}

impl Command {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut args = args.into_iter();
        let Some(name) = args.next() else {
            bail!("missing command; run `tally help` for the list");
        };
        let arg = args.next();
        let command = match name.as_str() {
            "teleport" => Self::Teleport,
            "bank-etl" => Self::BankEtl,
            "gtt" => Self::Gtt,
            "tick-size" => Self::TickSize,
            "quotes" => match arg.as_deref() {
                Some("stock") | None => Self::Quotes(tally_core::Market::Stock),
                Some("etf") => Self::Quotes(tally_core::Market::Etf),
                Some(other) => bail!("unknown market `{other}`; expected stock or etf"),
            },
            "export-gtts" => Self::ExportGtts,
            "export-holdings" => Self::ExportHoldings,
            "check" => Self::Check(arg),
            "trigger" => Self::Trigger,
            "set-flag" => match arg.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("true") => Self::SetFlag(true),
                Some("false") => Self::SetFlag(false),
                _ => bail!("set-flag needs `true` or `false`"),
            },
            "date-roll" => Self::DateRoll(arg),
            other => bail!("unknown command `{other}`"),
        };
        Ok(command)
    }
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file();
    let (log_path, file_layer) = match log_file {
        Some((path, file)) => (
            Some(path),
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(env_filter)
        .init();

    if let Some(path) = log_path {
        tracing::debug!(path = %path.display(), "logging initialized");
    }
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.tally/logs/tally.log
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".tally").join("logs").join("tally.log"));
    }

    // Fallback: ./.tally/logs/tally.log
    candidates.push(PathBuf::from(".tally").join("logs").join("tally.log"));

    candidates
}

fn usage() -> &'static str {
    "usage: tally <teleport|bank-etl|gtt|tick-size|quotes <stock|etf>|export-gtts|\
     export-holdings|check [name]|trigger|set-flag <true|false>|date-roll [name]>"
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("help" | "-h" | "--help")) {
        println!("{}", usage());
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "job failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Vec<String>) -> Result<Outcome> {
    let command = Command::parse(args).with_context(usage)?;
    let config = match TallyConfig::load().context("failed to load config")? {
        Some(config) => config,
        None => {
            tracing::info!("no config file; using defaults");
            TallyConfig::default()
        }
    };
    let jobs = Jobs::new(config, chrono::Local::now().date_naive());
    tracing::info!(?command, "starting");

    match command {
        Command::Teleport => jobs.teleport().await,
        Command::BankEtl => jobs.bank_etl().await,
        Command::Gtt => jobs.gtt().await,
        Command::TickSize => jobs.tick_size().await,
        Command::Quotes(market) => jobs.quotes(market).await,
        Command::ExportGtts => jobs.export_gtts().await,
        Command::ExportHoldings => jobs.export_holdings().await,
        Command::Check(name) => jobs.check(name.as_deref()).await,
        Command::Trigger => jobs.trigger().await,
        Command::SetFlag(value) => jobs.set_flag(value).await,
        Command::DateRoll(name) => jobs.date_roll(name.as_deref()).await,
    }
}
