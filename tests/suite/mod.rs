//! Integration test modules

mod checks;
mod config;
mod gtt;
mod ledger;
mod market;
