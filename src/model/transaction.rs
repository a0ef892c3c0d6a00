use crate::model::Amount;
use anyhow::bail;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Income category for tithes.
pub const TITHE: &str = "Tithe";
/// Income category for regular offerings.
pub const OFFERING: &str = "Offering";
/// Income category for one-off donations.
pub const SPECIAL_DONATION: &str = "Special Donation";
/// Income row written on a destination account when a transfer completes.
pub const TRANSFER_IN: &str = "Transfer In";
/// Expense row written on the source account when a transfer completes.
pub const TRANSFER_OUT: &str = "Transfer Out";

/// Whether money came in or went out.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
    clap::ValueEnum,
)]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "Income",
            TransactionKind::Expense => "Expense",
        }
    }
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = anyhow::Error;

    /// Case-insensitive. Also accepts the bank-statement words `credit` and `debit`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" | "credit" => Ok(TransactionKind::Income),
            "expense" | "debit" => Ok(TransactionKind::Expense),
            other => bail!("Unknown transaction type '{other}', expected Income or Expense"),
        }
    }
}

/// A transaction is `Pending` while an online payment has not been confirmed. Only `Completed`
/// transactions count toward balances, summaries and reports.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    #[default]
    Completed,
}

serde_plain::derive_display_from_serialize!(TransactionStatus);
serde_plain::derive_fromstr_from_deserialize!(TransactionStatus);

/// A normalized ledger record.
///
/// The `amount` is never negative; direction is carried by `kind` alone. Use
/// `TransactionRecord::new`, which normalizes a signed amount, rather than filling the struct in
/// by hand when the sign of the input is not known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransactionRecord {
    pub id: String,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub category: String,
    /// The name of the branch that owns the record.
    pub branch: String,
    pub date: NaiveDate,
    pub recorded_by: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    /// An external reference such as a payment provider source id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub status: TransactionStatus,
}

impl TransactionRecord {
    /// Creates a completed record. A negative `amount` flips `kind` and is stored as its absolute
    /// value.
    pub fn new(
        id: impl Into<String>,
        kind: TransactionKind,
        amount: Amount,
        category: impl Into<String>,
        branch: impl Into<String>,
        date: NaiveDate,
        recorded_by: impl Into<String>,
    ) -> Self {
        let (kind, amount) = normalize(kind, amount);
        Self {
            id: id.into(),
            amount,
            kind,
            category: category.into(),
            branch: branch.into(),
            date,
            recorded_by: recorded_by.into(),
            description: String::new(),
            account_id: None,
            donor: None,
            transfer_id: None,
            reference: None,
            status: TransactionStatus::Completed,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_donor(mut self, donor: impl Into<String>) -> Self {
        self.donor = Some(donor.into());
        self
    }

    pub fn with_transfer(mut self, transfer_id: impl Into<String>) -> Self {
        self.transfer_id = Some(transfer_id.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    /// The effect of this record on an account balance: positive for income, negative for expense.
    pub fn balance_effect(&self) -> Amount {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => -self.amount,
        }
    }

    /// True for the paired rows written by a completed fund transfer.
    pub fn is_transfer(&self) -> bool {
        self.transfer_id.is_some()
    }
}

/// Moves any sign out of `amount` and into the kind.
pub fn normalize(kind: TransactionKind, amount: Amount) -> (TransactionKind, Amount) {
    if amount.is_negative() {
        let flipped = match kind {
            TransactionKind::Income => TransactionKind::Expense,
            TransactionKind::Expense => TransactionKind::Income,
        };
        (flipped, amount.abs())
    } else {
        (kind, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 9).unwrap()
    }

    #[test]
    fn test_new_normalizes_negative_amount() {
        let r = TransactionRecord::new(
            "txn-1",
            TransactionKind::Income,
            Amount::from_str("-120").unwrap(),
            "Utilities",
            "Main",
            date(),
            "ana@example.org",
        );
        assert_eq!(r.kind, TransactionKind::Expense);
        assert_eq!(r.amount, Amount::from_str("120").unwrap());
        assert_eq!(r.balance_effect(), Amount::from_str("-120").unwrap());
    }

    #[test]
    fn test_new_keeps_positive_amount() {
        let r = TransactionRecord::new(
            "txn-2",
            TransactionKind::Income,
            Amount::from_str("500").unwrap(),
            TITHE,
            "Main",
            date(),
            "ana@example.org",
        );
        assert_eq!(r.kind, TransactionKind::Income);
        assert_eq!(r.status, TransactionStatus::Completed);
        assert!(!r.is_transfer());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            TransactionKind::from_str("INCOME").unwrap(),
            TransactionKind::Income
        );
        assert_eq!(
            TransactionKind::from_str(" debit ").unwrap(),
            TransactionKind::Expense
        );
        assert!(TransactionKind::from_str("transfer").is_err());
    }

    #[test]
    fn test_record_serializes_kind_as_title_case() {
        let r = TransactionRecord::new(
            "txn-3",
            TransactionKind::Expense,
            Amount::from_str("75").unwrap(),
            "Electricity",
            "North",
            date(),
            "ben@example.org",
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["kind"], "Expense");
        assert_eq!(json["amount"], "75.00");
        assert_eq!(json["date"], "2025-03-09");
        assert!(json.get("donor").is_none());
    }
}
