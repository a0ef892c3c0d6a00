use crate::model::Amount;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The lifecycle of a transfer request.
///
/// ```text
/// Pending ──approve──> Approved ──reconcile──> Completed
///    └─────reject────> Rejected
/// ```
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
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

serde_plain::derive_display_from_serialize!(TransferStatus);
serde_plain::derive_fromstr_from_deserialize!(TransferStatus);

/// How the money moves.
#[derive(
    Debug,
    Default,
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
pub enum TransferMethod {
    /// Book entry only; the cash is moved by hand.
    #[default]
    Internal,
    /// The payment provider pays out to each destination account number before the book entry.
    Payout,
}

serde_plain::derive_display_from_serialize!(TransferMethod);
serde_plain::derive_fromstr_from_deserialize!(TransferMethod);

/// One destination of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransferLeg {
    pub position: i64,
    pub account_id: String,
    pub amount: Amount,
    /// Set once the provider has accepted the payout for this leg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_id: Option<String>,
}

/// A request to move funds from one account to one or more others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransferRequest {
    pub id: String,
    pub source_account_id: String,
    pub legs: Vec<TransferLeg>,
    /// Always the sum of the legs.
    pub amount: Amount,
    pub purpose: String,
    pub method: TransferMethod,
    pub status: TransferStatus,
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TransferRequest {
    /// Legs whose payout has not been issued yet.
    pub fn unpaid_legs(&self) -> impl Iterator<Item = &TransferLeg> {
        self.legs.iter().filter(|l| l.payout_id.is_none())
    }
}
