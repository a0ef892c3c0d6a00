//! Report export. A report is an `ExportTable` rendered as a PDF document or as CSV.

mod csv;
mod pdf;

pub(crate) use self::csv::{parse_strict_date, read_records, write_records};

use crate::error::Res;
use crate::finance::ExportTable;
use crate::model::TransactionRecord;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// A4 portrait document with a title, the applied filters, the table and a totals block.
    #[default]
    Pdf,
    /// One header row then one row per record, in the same layout `transactions import` reads.
    Csv,
}

serde_plain::derive_display_from_serialize!(ReportFormat);
serde_plain::derive_fromstr_from_deserialize!(ReportFormat);

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Csv => "csv",
        }
    }
}

/// Renders the report in `format`. CSV is written from the records so that it can be imported
/// again; PDF is drawn from the formatted table.
pub(crate) fn render(
    format: ReportFormat,
    table: &ExportTable,
    records: &[TransactionRecord],
) -> Res<Vec<u8>> {
    match format {
        ReportFormat::Pdf => pdf::render(table),
        ReportFormat::Csv => write_records(records),
    }
}
