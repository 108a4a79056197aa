//! Configuration loading for tally.
//!
//! The config file is TOML, read from `$TALLY_CONFIG` or `~/.tally/config.toml`.
//! Every section is optional and every field has a default, so an empty file is
//! a valid configuration. Secrets may reference the environment as `${NAME}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fmt};

use serde::Deserialize;
use tally_types::SpreadsheetId;
use thiserror::Error;

pub const CONFIG_ENV: &str = "TALLY_CONFIG";

pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
pub const DEFAULT_KITE_BASE_URL: &str = "https://api.kite.trade";
pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_NSE_LIST_URL: &str =
    "https://nsearchives.nseindia.com/content/equities/EQUITY_L.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub google: GoogleConfig,
    pub kite: KiteConfig,
    /// Alias -> spreadsheet URL or key.
    pub spreadsheets: BTreeMap<String, String>,
    pub teleport: TeleportConfig,
    pub bank_etl: BankEtlConfig,
    pub gtt: GttConfig,
    pub tick_size: TickSizeConfig,
    pub quotes: QuotesConfig,
    pub snapshots: SnapshotsConfig,
    pub checks: Vec<CheckConfig>,
    pub date_rolls: Vec<DateRollConfig>,
    pub flag: FlagConfig,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// OAuth bearer token for the Sheets API.
    pub access_token: Option<String>,
    pub base_url: String,
    pub max_requests_per_minute: u32,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            max_requests_per_minute: 55,
            max_retries: 6,
            backoff_base_ms: 600,
            timeout_secs: 60,
        }
    }
}

// Manual Debug impl to prevent leaking tokens in logs.
impl fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("access_token", &mask(self.access_token.as_ref()))
            .field("base_url", &self.base_url)
            .field("max_requests_per_minute", &self.max_requests_per_minute)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct KiteConfig {
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for KiteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            access_token: None,
            base_url: DEFAULT_KITE_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for KiteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KiteConfig")
            .field("api_key", &mask(self.api_key.as_ref()))
            .field("access_token", &mask(self.access_token.as_ref()))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn mask(opt: Option<&String>) -> &'static str {
    if opt.is_some() { "[REDACTED]" } else { "None" }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TeleportConfig {
    pub source: String,
    pub dest: String,
    pub inc_tab: String,
    pub new_tab: String,
    pub final_tab: String,
    pub page_size: u32,
    pub batch_update_size: usize,
    pub append_chunk: usize,
    pub row_buffer: u32,
    pub batch_sleep_ms: u64,
    pub sample_size: usize,
}

impl Default for TeleportConfig {
    fn default() -> Self {
        Self {
            source: "bank_source".to_string(),
            dest: "bank_dest".to_string(),
            inc_tab: "BANK_INC".to_string(),
            new_tab: "BANK_NEW".to_string(),
            final_tab: "BANK_FINAL".to_string(),
            page_size: 10_000,
            batch_update_size: 500,
            append_chunk: 500,
            row_buffer: 100,
            batch_sleep_ms: 150,
            sample_size: 100,
        }
    }
}

/// One cell that must hold an expected value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CellExpectation {
    /// Spreadsheet alias; the job's own spreadsheet when absent.
    #[serde(default)]
    pub spreadsheet: Option<String>,
    pub tab: String,
    pub cell: String,
    pub equals: String,
}

impl CellExpectation {
    fn new(tab: &str, cell: &str, equals: &str) -> Self {
        Self {
            spreadsheet: None,
            tab: tab.to_string(),
            cell: cell.to_string(),
            equals: equals.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BankEtlConfig {
    pub source: String,
    pub dest: String,
    pub stock_tab: String,
    pub etf_tab: String,
    pub inc_tab: String,
    pub new_tab: String,
    pub tickers_tab: String,
    pub post_checks: Vec<CellExpectation>,
}

impl Default for BankEtlConfig {
    fn default() -> Self {
        Self {
            source: "market_data".to_string(),
            dest: "bank_source".to_string(),
            stock_tab: "NSE_Stock_Data".to_string(),
            etf_tab: "NSE_ETF_Data".to_string(),
            inc_tab: "BANK_INC".to_string(),
            new_tab: "BANK_NEW".to_string(),
            tickers_tab: "TICKERS".to_string(),
            post_checks: vec![
                CellExpectation::new("BANK_FINAL", "H1", "0"),
                CellExpectation::new("BANK_FINAL", "I1", "0"),
                CellExpectation::new("EXTREME_CHANGES", "J1", "0"),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GttConfig {
    pub spreadsheet: String,
    pub instructions_tab: String,
    pub data_tab: String,
    pub batch_size: u32,
    pub start_row: u32,
}

impl Default for GttConfig {
    fn default() -> Self {
        Self {
            spreadsheet: "gtt_master".to_string(),
            instructions_tab: "GTT_INSTRUCTIONS".to_string(),
            data_tab: "GTT_DATA".to_string(),
            batch_size: 1000,
            start_row: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TickSizeConfig {
    pub spreadsheet: String,
    pub tab: String,
}

impl Default for TickSizeConfig {
    fn default() -> Self {
        Self {
            spreadsheet: "market_data".to_string(),
            tab: "TICKERS_TICK_SIZE".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QuotesConfig {
    pub spreadsheet: String,
    pub stock_tab: String,
    pub etf_tab: String,
    /// Custom stock list; the NSE equity list is used when absent.
    pub stock_ticker_file: Option<PathBuf>,
    /// Required for ETF runs.
    pub etf_ticker_file: Option<PathBuf>,
    pub stock_csv: PathBuf,
    pub etf_csv: PathBuf,
    pub failed_symbols_file: PathBuf,
    pub nse_list_url: String,
    pub yahoo_base_url: String,
    pub workers: usize,
    pub upload_batch: usize,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            spreadsheet: "market_data".to_string(),
            stock_tab: "NSE_Stock_Data".to_string(),
            etf_tab: "NSE_ETF_Data".to_string(),
            stock_ticker_file: None,
            etf_ticker_file: None,
            stock_csv: PathBuf::from("nse_stock_data.csv"),
            etf_csv: PathBuf::from("nse_etf_data.csv"),
            failed_symbols_file: PathBuf::from("failed_symbols.csv"),
            nse_list_url: DEFAULT_NSE_LIST_URL.to_string(),
            yahoo_base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            workers: 10,
            upload_batch: 200,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SnapshotsConfig {
    pub spreadsheet: String,
    pub gtt_tab: String,
    pub holdings_tab: String,
    /// Cells on the holdings tab that signal a complete sheet-side refresh.
    pub holdings_checks: Vec<CellExpectation>,
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self {
            spreadsheet: "portfolio".to_string(),
            gtt_tab: "ZERODHA_GTT_DATA".to_string(),
            holdings_tab: "ZERODHA_PORTFOLIO".to_string(),
            holdings_checks: vec![
                CellExpectation::new("ZERODHA_PORTFOLIO", "J1", "0"),
                CellExpectation::new("ZERODHA_PORTFOLIO", "K1", "True"),
            ],
        }
    }
}

/// A `[[checks]]` entry. `equals` wins over `greater_than` when both are set.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub spreadsheet: String,
    pub tab: String,
    pub cell: String,
    #[serde(default)]
    pub equals: Option<String>,
    #[serde(default)]
    pub greater_than: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateRollConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub spreadsheet: String,
    pub source_tab: String,
    pub source_cell: String,
    /// Same as `source_tab` when absent.
    #[serde(default)]
    pub dest_tab: Option<String>,
    pub dest_cell: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FlagConfig {
    pub spreadsheet: String,
    pub tab: String,
    pub cell: String,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            spreadsheet: "gtt_master".to_string(),
            tab: "ALL_OLD_GTTs".to_string(),
            cell: "R1".to_string(),
        }
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[pos..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_secret(secret: &mut Option<String>) {
    if let Some(value) = secret.take() {
        let expanded = expand_env_vars(&value);
        *secret = (!expanded.trim().is_empty()).then_some(expanded);
    }
}

impl TallyConfig {
    /// Load the config file. A missing file yields `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file");
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::parse(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Parse TOML text and expand `${ENV}` references in secrets.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        expand_secret(&mut config.google.access_token);
        expand_secret(&mut config.kite.api_key);
        expand_secret(&mut config.kite.access_token);
        Ok(config)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Resolve an alias from `[spreadsheets]`, falling back to treating the
    /// name itself as a URL or key.
    #[must_use]
    pub fn spreadsheet(&self, alias_or_id: &str) -> SpreadsheetId {
        let target = self
            .spreadsheets
            .get(alias_or_id)
            .map_or(alias_or_id, String::as_str);
        SpreadsheetId::parse(target)
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".tally").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("hello world"), "hello world");
    }

    #[test]
    fn expand_env_vars_single_var() {
        unsafe {
            std::env::set_var("TALLY_TEST_TOKEN", "replaced");
        }
        let result = expand_env_vars("prefix ${TALLY_TEST_TOKEN} suffix");
        assert_eq!(result, "prefix replaced suffix");
        unsafe {
            std::env::remove_var("TALLY_TEST_TOKEN");
        }
    }

    #[test]
    fn expand_env_vars_missing_var_becomes_empty() {
        unsafe {
            std::env::remove_var("TALLY_MISSING_VAR");
        }
        assert_eq!(expand_env_vars("a ${TALLY_MISSING_VAR} b"), "a  b");
    }

    #[test]
    fn expand_env_vars_unclosed_and_empty_preserved() {
        assert_eq!(expand_env_vars("x ${UNCLOSED"), "x ${UNCLOSED");
        assert_eq!(expand_env_vars("x ${} y"), "x  y");
        assert_eq!(expand_env_vars("₹${}₹"), "₹₹");
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = TallyConfig::parse("").unwrap();
        assert_eq!(config.google.max_requests_per_minute, 55);
        assert_eq!(config.google.max_retries, 6);
        assert_eq!(config.google.backoff_base_ms, 600);
        assert_eq!(config.teleport.page_size, 10_000);
        assert_eq!(config.gtt.batch_size, 1000);
        assert_eq!(config.bank_etl.post_checks.len(), 3);
        assert_eq!(config.flag.cell, "R1");
        assert!(config.checks.is_empty());
    }

    #[test]
    fn parse_sections_and_tables() {
        let toml_str = r#"
[google]
access_token = "ya29.token"
max_requests_per_minute = 30

[spreadsheets]
gtt_master = "https://docs.google.com/spreadsheets/d/1GttKey/edit"

[teleport]
page_size = 500

[[checks]]
name = "credit candidates"
spreadsheet = "portfolio"
tab = "CREDIT_CANDIDATES"
cell = "K1"
greater_than = 0.99

[[date_rolls]]
spreadsheet = "kwk"
source_tab = "Friday_Identifier"
source_cell = "B1"
dest_cell = "A2"
"#;
        let config = TallyConfig::parse(toml_str).unwrap();
        assert_eq!(config.google.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(config.google.max_requests_per_minute, 30);
        assert_eq!(config.google.max_retries, 6);
        assert_eq!(config.teleport.page_size, 500);
        assert_eq!(config.teleport.final_tab, "BANK_FINAL");
        assert_eq!(config.checks[0].greater_than, Some(0.99));
        assert_eq!(config.date_rolls[0].dest_tab, None);
        assert_eq!(config.spreadsheet("gtt_master").as_str(), "1GttKey");
        assert_eq!(config.spreadsheet("1RawKey").as_str(), "1RawKey");
    }

    #[test]
    fn secrets_expand_from_environment() {
        unsafe {
            std::env::set_var("TALLY_TEST_KITE_TOKEN", "kite-secret");
            std::env::remove_var("TALLY_TEST_UNSET_KEY");
        }
        let config = TallyConfig::parse(
            r#"
[kite]
api_key = "${TALLY_TEST_UNSET_KEY}"
access_token = "${TALLY_TEST_KITE_TOKEN}"
"#,
        )
        .unwrap();
        assert_eq!(config.kite.access_token.as_deref(), Some("kite-secret"));
        assert_eq!(config.kite.api_key, None);
        unsafe {
            std::env::remove_var("TALLY_TEST_KITE_TOKEN");
        }
    }

    #[test]
    fn debug_redacts_tokens() {
        let config = TallyConfig::parse(
            r#"
[google]
access_token = "ya29.very-secret"
[kite]
api_key = "kite-key-123"
"#,
        )
        .unwrap();
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("ya29.very-secret"));
        assert!(!debug_output.contains("kite-key-123"));
    }

    #[test]
    fn load_from_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[google\nbroken").unwrap();
        let err = TallyConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), path.as_path());

        let missing = dir.path().join("missing.toml");
        let err = TallyConfig::load_from(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gtt]\nbatch_size = 50\n").unwrap();
        let config = TallyConfig::load_from(&path).unwrap();
        assert_eq!(config.gtt.batch_size, 50);
        assert_eq!(config.gtt.data_tab, "GTT_DATA");
    }
}
