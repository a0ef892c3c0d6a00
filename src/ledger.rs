//! Planning of fund transfer reconciliation.
//!
//! `plan_reconciliation` turns an approved `TransferRequest` into the ledger rows and balance
//! changes that complete it. It does no I/O; the database layer applies the plan inside a single
//! SQLite transaction.

use crate::error::Res;
use crate::model::{
    Amount, FinanceAccount, TransactionKind, TransactionRecord, TransferRequest, TRANSFER_IN,
    TRANSFER_OUT,
};
use crate::utils;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// The rows and balance changes that complete a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reconciliation {
    /// The `Transfer Out` row on the source account followed by one `Transfer In` row per leg.
    pub(crate) records: Vec<TransactionRecord>,
    /// Account id to new balance.
    pub(crate) balances: BTreeMap<String, Amount>,
}

/// Checks a transfer before it is stored. Called both when a request is made and again when it is
/// reconciled.
pub(crate) fn validate(transfer: &TransferRequest) -> Res<()> {
    if transfer.legs.is_empty() {
        bail!("A transfer needs at least one destination account");
    }
    for leg in &transfer.legs {
        if !leg.amount.is_positive() {
            bail!(
                "Transfer amounts must be greater than zero, got {} for account {}",
                leg.amount,
                leg.account_id
            );
        }
        if leg.account_id == transfer.source_account_id {
            bail!("A transfer cannot send money back to its source account");
        }
    }
    let legs_total: Amount = transfer.legs.iter().map(|l| l.amount).sum();
    if legs_total != transfer.amount {
        bail!(
            "Transfer total {} does not equal the sum of its destinations {}",
            transfer.amount,
            legs_total
        );
    }
    Ok(())
}

/// Builds the paired ledger rows for `transfer`.
///
/// `accounts` must contain the source account and every destination account. Fails, without
/// side effects, when the transfer is malformed or the source cannot cover it.
pub(crate) fn plan_reconciliation(
    transfer: &TransferRequest,
    accounts: &BTreeMap<String, FinanceAccount>,
    date: NaiveDate,
    actor: &str,
) -> Res<Reconciliation> {
    validate(transfer)?;

    let source = accounts
        .get(&transfer.source_account_id)
        .with_context(|| format!("Source account {} not found", transfer.source_account_id))?;
    if source.balance < transfer.amount {
        bail!(
            "Insufficient funds in {}: balance {} is less than the transfer amount {}",
            source.label(),
            source.balance,
            transfer.amount
        );
    }

    let mut balances: BTreeMap<String, Amount> = BTreeMap::new();
    balances.insert(source.id.clone(), source.balance - transfer.amount);

    let description = if transfer.purpose.is_empty() {
        format!("Transfer {}", transfer.id)
    } else {
        transfer.purpose.clone()
    };

    let mut records = vec![TransactionRecord::new(
        utils::new_id("txn"),
        TransactionKind::Expense,
        transfer.amount,
        TRANSFER_OUT,
        &source.branch,
        date,
        actor,
    )
    .with_account(&source.id)
    .with_transfer(&transfer.id)
    .with_description(&description)];

    for leg in &transfer.legs {
        let destination = accounts
            .get(&leg.account_id)
            .with_context(|| format!("Destination account {} not found", leg.account_id))?;
        // Two legs may target the same account, so accumulate.
        let current = balances
            .get(&destination.id)
            .copied()
            .unwrap_or(destination.balance);
        balances.insert(destination.id.clone(), current + leg.amount);
        records.push(
            TransactionRecord::new(
                utils::new_id("txn"),
                TransactionKind::Income,
                leg.amount,
                TRANSFER_IN,
                &destination.branch,
                date,
                actor,
            )
            .with_account(&destination.id)
            .with_transfer(&transfer.id)
            .with_description(&description),
        );
    }

    Ok(Reconciliation { records, balances })
}
