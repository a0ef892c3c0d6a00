use crate::model::{TransactionKind, TransactionRecord};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Criteria for selecting transaction records. Every criterion is optional and the provided ones
/// are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Filter {
    /// Branch name, compared case-insensitively.
    pub branch: Option<String>,
    /// Inclusive lower bound.
    pub start: Option<NaiveDate>,
    /// Inclusive upper bound.
    pub end: Option<NaiveDate>,
    pub kind: Option<TransactionKind>,
    /// Category, compared case-insensitively.
    pub category: Option<String>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.branch.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.kind.is_none()
            && self.category.is_none()
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(branch) = &self.branch {
            if !same_text(branch, &record.branch) {
                return false;
            }
        }
        if let Some(start) = self.start {
            if record.date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if record.date > end {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if !same_text(category, &record.category) {
                return false;
            }
        }
        true
    }

    /// A human-readable description of the criteria, used as a report subtitle.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(branch) = &self.branch {
            parts.push(format!("Branch: {branch}"));
        }
        match (self.start, self.end) {
            (Some(s), Some(e)) => parts.push(format!("{s} to {e}")),
            (Some(s), None) => parts.push(format!("From {s}")),
            (None, Some(e)) => parts.push(format!("Through {e}")),
            (None, None) => {}
        }
        if let Some(kind) = self.kind {
            parts.push(format!("Type: {kind}"));
        }
        if let Some(category) = &self.category {
            parts.push(format!("Category: {category}"));
        }
        if parts.is_empty() {
            "All transactions".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

/// Returns the records that match every provided criterion, in their original order.
pub fn filter_transactions(
    records: &[TransactionRecord],
    filter: &Filter,
) -> Vec<TransactionRecord> {
    if filter.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect()
}

/// Parses a date from user input. Accepts `YYYY-MM-DD`, RFC 3339 and `MM/DD/YYYY`.
///
/// Malformed input never fails: it falls back to today's date and logs a warning.
pub fn parse_date(s: &str) -> NaiveDate {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.date_naive();
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return d;
    }
    let today = Local::now().date_naive();
    warn!("Unable to parse date '{s}', using today ({today})");
    today
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
