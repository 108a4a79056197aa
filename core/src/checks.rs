//! Cell checks, boolean flags, and the date roll.

use chrono::NaiveDate;
use tally_config::{CellExpectation, CheckConfig};
use tally_types::{Cell, ValueRender};

use crate::ports::{SheetError, SheetStore};
use crate::records::{read_cell, write_cell};

pub const DEFAULT_THRESHOLD: f64 = 0.995;

const NULLISH: [&str; 5] = ["", "na", "n/a", "null", "none"];

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Equals(String),
    GreaterThan(f64),
}

impl Rule {
    #[must_use]
    pub fn from_config(check: &CheckConfig) -> Self {
        match &check.equals {
            Some(expected) => Self::Equals(expected.clone()),
            None => Self::GreaterThan(check.greater_than.unwrap_or(DEFAULT_THRESHOLD)),
        }
    }

    /// `Ok` with a short note on pass, `Err` with the reason on failure.
    pub fn evaluate(&self, cell: &Cell) -> Result<String, String> {
        let text = cell.as_text();
        match self {
            Self::Equals(expected) => {
                if text == expected.trim() {
                    Ok(format!("= {expected}"))
                } else {
                    Err(format!("expected {expected:?}, found {text:?}"))
                }
            }
            Self::GreaterThan(threshold) => {
                let value = if NULLISH.contains(&text.to_ascii_lowercase().as_str()) {
                    0.0
                } else {
                    cell.as_f64()
                        .ok_or_else(|| format!("non-numeric value {text:?}"))?
                };
                if value > *threshold {
                    Ok(format!("{value:.4} > {threshold}"))
                } else if value == 0.0 {
                    Err("value is zero or blank".to_string())
                } else {
                    Err(format!("{value:.4} is not greater than {threshold}"))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub label: String,
    pub value: String,
    pub passed: bool,
    pub detail: String,
}

/// Read `tab!cell` and evaluate `rule`. A failed read is a failed check.
pub async fn check_cell<S: SheetStore>(
    store: &S,
    label: &str,
    tab: &str,
    cell: &str,
    rule: &Rule,
) -> CheckOutcome {
    let value = match read_cell(store, tab, cell, ValueRender::Formatted).await {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(label, tab, cell, error = %err, "could not read check cell");
            return CheckOutcome {
                label: label.to_string(),
                value: String::new(),
                passed: false,
                detail: err.to_string(),
            };
        }
    };
    let (passed, detail) = match rule.evaluate(&value) {
        Ok(note) => (true, note),
        Err(reason) => (false, reason),
    };
    if passed {
        tracing::info!(label, tab, cell, value = %value, "check passed");
    } else {
        tracing::warn!(label, tab, cell, value = %value, reason = %detail, "check failed");
    }
    CheckOutcome {
        label: label.to_string(),
        value: value.as_text(),
        passed,
        detail,
    }
}

/// Evaluate `equals` expectations in order.
pub async fn expect_cells<S: SheetStore>(
    store: &S,
    expectations: &[CellExpectation],
) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::with_capacity(expectations.len());
    for expectation in expectations {
        let label = format!("{}!{}", expectation.tab, expectation.cell);
        outcomes.push(
            check_cell(
                store,
                &label,
                &expectation.tab,
                &expectation.cell,
                &Rule::Equals(expectation.equals.clone()),
            )
            .await,
        );
    }
    outcomes
}

/// `true` only when the cell reads `true` case-insensitively. Errors read as `false`.
pub async fn read_flag<S: SheetStore>(store: &S, tab: &str, cell: &str) -> bool {
    match read_cell(store, tab, cell, ValueRender::Formatted).await {
        Ok(value) => value.as_text().eq_ignore_ascii_case("true"),
        Err(err) => {
            tracing::warn!(tab, cell, error = %err, "could not read flag; treating as false");
            false
        }
    }
}

pub async fn set_flag<S: SheetStore>(
    store: &S,
    tab: &str,
    cell: &str,
    value: bool,
) -> Result<(), SheetError> {
    write_cell(store, tab, cell, Cell::Bool(value)).await?;
    tracing::info!(tab, cell, value, "flag written");
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRoll {
    pub source_tab: String,
    pub source_cell: String,
    pub dest_tab: String,
    pub dest_cell: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollStep {
    Copied(String),
    NotDue(NaiveDate),
    Unparsable(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRollOutcome {
    pub step: RollStep,
    pub changed: bool,
}

async fn roll<S: SheetStore>(
    store: &S,
    spec: &DateRoll,
    today: NaiveDate,
) -> Result<(RollStep, bool), SheetError> {
    let before = read_cell(store, &spec.dest_tab, &spec.dest_cell, ValueRender::Formatted)
        .await?
        .as_text();
    let value = read_cell(store, &spec.source_tab, &spec.source_cell, ValueRender::Formatted)
        .await?
        .as_text();
    let step = match NaiveDate::parse_from_str(&value, "%d-%b-%Y") {
        Err(_) => RollStep::Unparsable(value),
        Ok(date) if date > today => RollStep::NotDue(date),
        Ok(_) => {
            write_cell(store, &spec.dest_tab, &spec.dest_cell, Cell::text(value.clone())).await?;
            RollStep::Copied(value)
        }
    };
    let after = read_cell(store, &spec.dest_tab, &spec.dest_cell, ValueRender::Formatted)
        .await?
        .as_text();
    Ok((step, before != after))
}

/// Copy a `DD-Mon-YYYY` date cell when it is not in the future, then record in
/// the flag cell whether the destination changed. Any failure writes `FALSE`.
pub async fn roll_date<S: SheetStore, F: SheetStore>(
    store: &S,
    spec: &DateRoll,
    flag_store: &F,
    flag_tab: &str,
    flag_cell: &str,
    today: NaiveDate,
) -> Result<DateRollOutcome, SheetError> {
    let outcome = match roll(store, spec, today).await {
        Ok((step, changed)) => DateRollOutcome { step, changed },
        Err(err) => {
            tracing::error!(error = %err, "date roll failed");
            DateRollOutcome {
                step: RollStep::Failed(err.to_string()),
                changed: false,
            }
        }
    };
    match &outcome.step {
        RollStep::Copied(value) => tracing::info!(
            value = %value,
            from = %format!("{}!{}", spec.source_tab, spec.source_cell),
            to = %format!("{}!{}", spec.dest_tab, spec.dest_cell),
            "date copied"
        ),
        RollStep::NotDue(date) => tracing::info!(%date, "date is after today; not copying"),
        RollStep::Unparsable(value) => tracing::warn!(value = %value, "could not parse date"),
        RollStep::Failed(_) => {}
    }
    set_flag(flag_store, flag_tab, flag_cell, outcome.changed).await?;
    Ok(outcome)
}
