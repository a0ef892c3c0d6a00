mod backup;
mod config;
mod db;
mod error;
mod ledger;
mod mcp;
mod payments;
mod report;
mod utils;

pub mod args;
pub mod commands;
pub mod finance;
pub mod model;

pub use config::{Config, PaymentsConfig};
pub use error::{Error, ErrorType, Result};
pub use model::Amount;
pub use payments::{Mode, SourceKind, TEST_MODE_ENV};
pub use report::ReportFormat;

#[cfg(test)]
mod test;
