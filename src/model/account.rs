use crate::model::Amount;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where the money in a finance account is held.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Bank,
    Cash,
    EWallet,
}

serde_plain::derive_display_from_serialize!(AccountKind);
serde_plain::derive_fromstr_from_deserialize!(AccountKind);

/// A named ledger bucket belonging to a branch and, optionally, one of its ministries.
///
/// `balance` is the stored running balance. It is rewritten whenever a completed transaction
/// touches the account and can be rebuilt from the ledger with `ledger accounts recompute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FinanceAccount {
    pub id: String,
    pub branch_id: String,
    /// The branch name, joined in for display.
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ministry_id: Option<String>,
    pub name: String,
    pub kind: AccountKind,
    /// Bank or e-wallet number. Used as the destination of provider payouts.
    #[serde(default)]
    pub account_number: String,
    pub balance: Amount,
    pub created_at: String,
}

impl FinanceAccount {
    /// A short label such as `Main / General Fund`.
    pub fn label(&self) -> String {
        format!("{} / {}", self.branch, self.name)
    }
}

/// The difference between a stored balance and the balance implied by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDrift {
    pub account_id: String,
    pub account: String,
    pub stored: Amount,
    pub computed: Amount,
    pub drift: Amount,
}

