//! The CSV layout shared by report export and transaction import:
//! `Date,Type,Category,Branch,Amount,Description,Recorded By`.

use crate::error::Res;
use crate::model::{Amount, TransactionKind, TransactionRecord};
use crate::utils;
use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Category")]
    category: String,
    #[serde(rename = "Branch")]
    branch: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "Recorded By", default)]
    recorded_by: String,
}

/// Writes one header row then one row per record. Dates are `YYYY-MM-DD` and amounts are plain
/// decimals.
pub(crate) fn write_records(records: &[TransactionRecord]) -> Res<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    if records.is_empty() {
        writer.write_record([
            "Date",
            "Type",
            "Category",
            "Branch",
            "Amount",
            "Description",
            "Recorded By",
        ])?;
    }
    for r in records {
        writer
            .serialize(CsvRow {
                date: r.date.format("%Y-%m-%d").to_string(),
                kind: r.kind.to_string(),
                category: r.category.clone(),
                branch: r.branch.clone(),
                amount: format!("{:.2}", r.amount.value()),
                description: r.description.clone(),
                recorded_by: r.recorded_by.clone(),
            })
            .with_context(|| format!("Unable to write transaction {} as CSV", r.id))?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow!("Unable to finish writing CSV: {}", e.error()))
}

/// Reads records from CSV. Negative amounts become the opposite type, so `Income,-50` is stored
/// as a 50 expense. `default_recorder` fills an empty `Recorded By` column.
pub(crate) fn read_records(data: &str, default_recorder: &str) -> Res<Vec<TransactionRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    let mut records = Vec::new();
    for (ix, row) in reader.deserialize::<CsvRow>().enumerate() {
        // Line 1 is the header.
        let line = ix + 2;
        let row = row.with_context(|| format!("Line {line}: unable to read the row"))?;
        let record = to_record(row, default_recorder).with_context(|| format!("Line {line}"))?;
        records.push(record);
    }
    Ok(records)
}

fn to_record(row: CsvRow, default_recorder: &str) -> Res<TransactionRecord> {
    let date = parse_strict_date(&row.date)?;
    let kind = TransactionKind::from_str(&row.kind)?;
    let amount = Amount::from_str(&row.amount)
        .map_err(|e| anyhow!("Invalid amount '{}': {e}", row.amount))?;
    if row.category.is_empty() {
        bail!("The category is empty");
    }
    if row.branch.is_empty() {
        bail!("The branch is empty");
    }
    let recorded_by = if row.recorded_by.is_empty() {
        default_recorder.to_string()
    } else {
        row.recorded_by
    };
    Ok(TransactionRecord::new(
        utils::new_id("txn"),
        kind,
        amount,
        row.category,
        row.branch,
        date,
        recorded_by,
    )
    .with_description(row.description))
}

/// Unlike `finance::parse_date`, a bad date in a file is an error rather than today.
pub(crate) fn parse_strict_date(s: &str) -> Res<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .map_err(|_| anyhow!("Invalid date '{s}', expected YYYY-MM-DD or MM/DD/YYYY"))
}
