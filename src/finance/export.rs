use crate::finance::{aggregate, format_currency, format_date, Filter, Summary};
use crate::model::{Amount, TransactionRecord};
use serde::{Deserialize, Serialize};

/// Column headers, in the same order as `ExportRow::cells`.
pub const HEADERS: [&str; 7] = [
    "Date",
    "Type",
    "Category",
    "Branch",
    "Description",
    "Amount",
    "Recorded By",
];

/// One display row of a report. All values are already formatted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExportRow {
    pub date: String,
    pub kind: String,
    pub category: String,
    pub branch: String,
    pub description: String,
    pub amount: String,
    pub recorded_by: String,
}

impl ExportRow {
    pub fn cells(&self) -> [&str; 7] {
        [
            self.date.as_str(),
            self.kind.as_str(),
            self.category.as_str(),
            self.branch.as_str(),
            self.description.as_str(),
            self.amount.as_str(),
            self.recorded_by.as_str(),
        ]
    }
}

/// Builds one row per record, in input order.
pub fn export_rows(records: &[TransactionRecord], currency: &str) -> Vec<ExportRow> {
    records
        .iter()
        .map(|r| ExportRow {
            date: format_date(r.date),
            kind: r.kind.to_string(),
            category: r.category.clone(),
            branch: r.branch.clone(),
            description: match &r.donor {
                Some(donor) if r.description.is_empty() => donor.clone(),
                Some(donor) => format!("{} ({donor})", r.description),
                None => r.description.clone(),
            },
            amount: format_currency(r.amount, currency),
            recorded_by: r.recorded_by.clone(),
        })
        .collect()
}

/// Everything a renderer needs to produce a report document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExportTable {
    pub title: String,
    pub subtitle: String,
    pub headers: Vec<String>,
    pub rows: Vec<ExportRow>,
    pub summary: Summary,
    /// Label and formatted value pairs printed under the table.
    pub totals: Vec<(String, String)>,
}

impl ExportTable {
    /// Assembles a report for `records`, which the caller has already filtered with `filter`.
    pub fn build(
        title: impl Into<String>,
        filter: &Filter,
        records: &[TransactionRecord],
        currency: &str,
    ) -> Self {
        let summary = aggregate(records);
        let money = |a: Amount| format_currency(a, currency);
        let totals = vec![
            ("Total Income".to_string(), money(summary.income)),
            ("Tithes".to_string(), money(summary.tithes)),
            ("Offerings".to_string(), money(summary.offerings)),
            ("Donations".to_string(), money(summary.donations)),
            ("Other Income".to_string(), money(summary.other_income)),
            ("Total Expenses".to_string(), money(summary.expenses)),
            ("Net".to_string(), money(summary.net)),
        ];
        Self {
            title: title.into(),
            subtitle: filter.describe(),
            headers: HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: export_rows(records, currency),
            summary,
            totals,
        }
    }
}
