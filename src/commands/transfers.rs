//! Fund transfer handlers.
//!
//! Approving a transfer also completes it. For `Payout` transfers the provider pays every leg
//! first, and each payout id is stored as soon as it is issued. If anything fails after approval
//! the transfer stays `Approved`, and `resume_transfer` picks up where it stopped, skipping legs
//! whose payout id is stored.
//!
//! A leg whose payout was issued but whose id was never stored (the process died, or
//! `set_leg_payout` failed) is requested again on resume. Every payout carries the reference
//! `{transfer_id}:{position}`, sent as the `Idempotency-Key` header, and the provider must answer
//! the repeat with the original payout. A provider that ignores the key pays that leg twice.

use crate::args::RequestTransferArgs;
use crate::commands::{authorize, Out};
use crate::db::{Db, NewTransfer, Review};
use crate::error::{ErrorType, IntoResult, Res};
use crate::finance::format_currency;
use crate::model::{Permission, TransactionRecord, TransferMethod, TransferRequest, TransferStatus};
use crate::payments::{self, Provider};
use crate::utils::plural;
use crate::{Config, Error, Mode, Result};
use anyhow::Context;
use chrono::Local;
use tracing::{debug, info};

/// Stores a new `Pending` transfer. Requires `RequestTransfers`.
pub async fn request_transfer(
    config: Config,
    actor: &str,
    args: RequestTransferArgs,
) -> Result<Out<TransferRequest>> {
    let me = authorize(&config, actor, Permission::RequestTransfers).await?;
    if args.to.is_empty() {
        return Err(Error::msg(
            ErrorType::Validation,
            "A transfer needs at least one destination",
        ));
    }
    let new = NewTransfer {
        source: args.from,
        destinations: args.to.into_iter().map(|d| (d.account, d.amount)).collect(),
        purpose: args.purpose,
        method: args.method,
    };
    let transfer = config
        .db()
        .request_transfer(&me.email, new)
        .await
        .pub_result(ErrorType::Validation)?;
    Ok(Out::new(
        format!(
            "Requested transfer {} of {} to {} account{}",
            transfer.id,
            format_currency(transfer.amount, config.currency()),
            transfer.legs.len(),
            plural(transfer.legs.len())
        ),
        transfer,
    ))
}

pub async fn list_transfers(
    config: Config,
    actor: &str,
    status: Option<TransferStatus>,
) -> Result<Out<Vec<TransferRequest>>> {
    authorize(&config, actor, Permission::ViewFinances).await?;
    let transfers = config
        .db()
        .list_transfers(status)
        .await
        .pub_result(ErrorType::Database)?;
    let mut message = format!("{} transfer{}", transfers.len(), plural(transfers.len()));
    for t in &transfers {
        message.push_str(&format!(
            "\n  {} {} {} ({}) {}",
            t.id,
            t.status,
            format_currency(t.amount, config.currency()),
            t.method,
            t.purpose
        ));
    }
    Ok(Out::new(message, transfers))
}

/// Approves a `Pending` transfer and completes it. A backup of the database is taken first.
/// Requires `ReviewTransfers`.
///
/// # Errors
/// - `Validation` when the transfer is not pending or the source cannot cover it. Nothing changes.
/// - `Payment` when a payout fails. The transfer stays `Approved`; run `resume_transfer` later.
pub async fn approve_transfer(
    config: Config,
    mode: Mode,
    actor: &str,
    id: &str,
    note: Option<&str>,
) -> Result<Out<TransferRequest>> {
    let me = authorize(&config, actor, Permission::ReviewTransfers).await?;
    let backup = config
        .backup()
        .copy_sqlite()
        .await
        .context("Unable to back up the database before approving the transfer")
        .pub_result(ErrorType::Database)?;
    debug!("Backed up to {}", backup.display());

    let transfer = config
        .db()
        .review_transfer(&me.email, id, Review::Approve, note)
        .await
        .pub_result(ErrorType::Validation)?;
    finish(&config, mode, &me.email, transfer).await
}

pub async fn reject_transfer(
    config: Config,
    actor: &str,
    id: &str,
    note: Option<&str>,
) -> Result<Out<TransferRequest>> {
    let me = authorize(&config, actor, Permission::ReviewTransfers).await?;
    let transfer = config
        .db()
        .review_transfer(&me.email, id, Review::Reject, note)
        .await
        .pub_result(ErrorType::Validation)?;
    Ok(Out::new(format!("Rejected transfer {}", transfer.id), transfer))
}

/// Completes an `Approved` transfer whose completion was interrupted. Requires `ReviewTransfers`.
pub async fn resume_transfer(
    config: Config,
    mode: Mode,
    actor: &str,
    id: &str,
) -> Result<Out<TransferRequest>> {
    let me = authorize(&config, actor, Permission::ReviewTransfers).await?;
    let transfer = config
        .db()
        .require_transfer(id)
        .await
        .pub_result(ErrorType::Database)?;
    if transfer.status != TransferStatus::Approved {
        return Err(Error::msg(
            ErrorType::Validation,
            format!(
                "Transfer {} is {}, only approved transfers can be resumed",
                transfer.id, transfer.status
            ),
        ));
    }
    finish(&config, mode, &me.email, transfer).await
}

async fn finish(
    config: &Config,
    mode: Mode,
    actor: &str,
    transfer: TransferRequest,
) -> Result<Out<TransferRequest>> {
    let (provider, error_type) = match transfer.method {
        TransferMethod::Payout => (
            Some(
                payments::provider(config, mode)
                    .await
                    .pub_result(ErrorType::Payment)?,
            ),
            ErrorType::Payment,
        ),
        TransferMethod::Internal => (None, ErrorType::Database),
    };
    let (transfer, records) = complete_transfer(config.db(), provider.as_deref(), actor, transfer)
        .await
        .pub_result(error_type)?;
    Ok(Out::new(
        format!(
            "Completed transfer {} of {} with {} ledger row{}",
            transfer.id,
            format_currency(transfer.amount, config.currency()),
            records.len(),
            plural(records.len())
        ),
        transfer,
    ))
}

/// Pays any unpaid legs of a `Payout` transfer, then reconciles the transfer in one SQLite
/// transaction. The payout reference is `{transfer_id}:{position}`.
///
/// The reconciliation is checked against the current balances before any leg is paid, so a
/// source drawn down since approval stops the transfer before money leaves.
pub(crate) async fn complete_transfer(
    db: &Db,
    provider: Option<&dyn Provider>,
    actor: &str,
    transfer: TransferRequest,
) -> Res<(TransferRequest, Vec<TransactionRecord>)> {
    let today = Local::now().date_naive();
    db.check_transfer(&transfer.id, today, actor).await?;
    if transfer.method == TransferMethod::Payout {
        let provider = provider.context("A payout transfer needs a payment provider")?;
        for leg in transfer.unpaid_legs() {
            let account = db.require_account(&leg.account_id).await?;
            let recipient = provider
                .create_recipient(
                    &account.label(),
                    &account.account_number,
                    payments::channel(account.kind),
                )
                .await
                .with_context(|| format!("Unable to register {} for payout", account.label()))?;
            let reference = format!("{}:{}", transfer.id, leg.position);
            let payout = provider
                .create_payout(&recipient.id, leg.amount, &reference)
                .await
                .with_context(|| format!("Payout to {} failed", account.label()))?;
            db.set_leg_payout(actor, &transfer.id, leg.position, &payout.id)
                .await?;
            info!("Paid {} to {} ({})", leg.amount, account.label(), payout.id);
        }
    }
    db.reconcile_transfer(actor, &transfer.id, today).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Destination;
    use crate::model::Amount;
    use crate::payments::TestProvider;
    use crate::test::{amt, TestEnv};

    fn request(to: &[(&str, &str)], method: TransferMethod) -> RequestTransferArgs {
        RequestTransferArgs {
            from: "Main Fund".into(),
            to: to
                .iter()
                .map(|(account, amount)| Destination {
                    account: account.to_string(),
                    amount: amt(amount),
                })
                .collect(),
            purpose: "Mission support".into(),
            method,
        }
    }

    async fn total(env: &TestEnv) -> Amount {
        env.config()
            .db()
            .list_accounts(None)
            .await
            .unwrap()
            .iter()
            .map(|a| a.balance)
            .sum()
    }

    #[tokio::test]
    async fn test_internal_transfer_round_trip() {
        let env = TestEnv::new().await;
        let config = env.config();
        let before = total(&env).await;

        let out = request_transfer(
            config.clone(),
            TestEnv::FINANCE,
            request(&[("North Fund", "750")], TransferMethod::Internal),
        )
        .await
        .unwrap();
        let id = out.structure().unwrap().id.clone();

        let err = approve_transfer(config.clone(), Mode::Testing, TestEnv::FINANCE, &id, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Permission);

        let out = approve_transfer(config.clone(), Mode::Testing, TestEnv::BISHOP, &id, Some("ok"))
            .await
            .unwrap();
        let transfer = out.structure().unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);

        assert_eq!(env.balance(&env.main_fund().id).await, amt("9250"));
        assert_eq!(env.balance(&env.north_fund().id).await, amt("2750"));
        assert_eq!(total(&env).await, before);

        // The approval took a backup.
        assert_eq!(std::fs::read_dir(config.backups()).unwrap().count(), 1);

        let out = list_transfers(config, TestEnv::FINANCE, Some(TransferStatus::Completed))
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payout_transfer_pays_each_leg() {
        let env = TestEnv::new().await;
        let config = env.config();
        let out = request_transfer(
            config.clone(),
            TestEnv::ADMIN,
            request(&[("North Fund", "300")], TransferMethod::Payout),
        )
        .await
        .unwrap();
        let id = out.structure().unwrap().id.clone();

        let out = approve_transfer(config.clone(), Mode::Testing, TestEnv::ADMIN, &id, None)
            .await
            .unwrap();
        let transfer = out.structure().unwrap();
        assert_eq!(transfer.status, TransferStatus::Completed);

        let stored = config.db().require_transfer(&id).await.unwrap();
        assert!(stored.legs.iter().all(|l| l.payout_id.is_some()));
        assert_eq!(env.balance(&env.north_fund().id).await, amt("2300"));
    }

    #[tokio::test]
    async fn test_resume_does_not_pay_twice() {
        let env = TestEnv::new().await;
        let config = env.config();
        let db = config.db();
        let out = request_transfer(
            config.clone(),
            TestEnv::ADMIN,
            request(&[("North Fund", "100"), ("North Fund", "50")], TransferMethod::Payout),
        )
        .await
        .unwrap();
        let id = out.structure().unwrap().id.clone();
        db.review_transfer(TestEnv::ADMIN, &id, Review::Approve, None)
            .await
            .unwrap();

        // Leg 0 was paid before an interruption.
        let provider = TestProvider::new("PHP");
        let r = provider.create_recipient("North", "0917", "e_wallet").await.unwrap();
        let first = provider
            .create_payout(&r.id, amt("100"), &format!("{id}:0"))
            .await
            .unwrap();
        db.set_leg_payout(TestEnv::ADMIN, &id, 0, &first.id)
            .await
            .unwrap();

        let transfer = db.require_transfer(&id).await.unwrap();
        let provider_ref: &dyn Provider = &provider;
        let (done, records) = complete_transfer(db, Some(provider_ref), TestEnv::ADMIN, transfer)
            .await
            .unwrap();
        assert_eq!(done.status, TransferStatus::Completed);
        assert_eq!(records.len(), 3);

        let payouts = provider.payouts();
        assert_eq!(payouts.len(), 2);
        assert_eq!(payouts[1].reference, format!("{id}:1"));

        let err = resume_transfer(config, Mode::Testing, TestEnv::ADMIN, &id)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[tokio::test]
    async fn test_resume_checks_balance_before_paying() {
        let env = TestEnv::new().await;
        let config = env.config();
        let db = config.db();
        let out = request_transfer(
            config.clone(),
            TestEnv::ADMIN,
            request(&[("North Fund", "4000"), ("North Fund", "4000")], TransferMethod::Payout),
        )
        .await
        .unwrap();
        let id = out.structure().unwrap().id.clone();
        db.review_transfer(TestEnv::ADMIN, &id, Review::Approve, None)
            .await
            .unwrap();

        let provider = TestProvider::new("PHP");
        let r = provider.create_recipient("North", "0917", "e_wallet").await.unwrap();
        let first = provider
            .create_payout(&r.id, amt("4000"), &format!("{id}:0"))
            .await
            .unwrap();
        db.set_leg_payout(TestEnv::ADMIN, &id, 0, &first.id)
            .await
            .unwrap();

        // The source is drawn down while the transfer sits approved.
        crate::commands::record_expense(
            config.clone(),
            TestEnv::FINANCE,
            crate::args::RecordExpenseArgs {
                account: Some("Main Fund".into()),
                branch: None,
                amount: amt("5000"),
                category: "Building Repair".into(),
                date: None,
                description: String::new(),
            },
        )
        .await
        .unwrap();

        let transfer = db.require_transfer(&id).await.unwrap();
        let provider_ref: &dyn Provider = &provider;
        let err = complete_transfer(db, Some(provider_ref), TestEnv::ADMIN, transfer)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Insufficient funds"), "{err:#}");

        // Only the payout issued before the interruption exists.
        assert_eq!(provider.payouts().len(), 1);
        let stored = db.require_transfer(&id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::Approved);
        assert!(stored.legs[1].payout_id.is_none());
        assert_eq!(env.balance(&env.main_fund().id).await, amt("5000"));
    }

    #[tokio::test]
    async fn test_resume_repeats_unrecorded_payout_reference() {
        let env = TestEnv::new().await;
        let config = env.config();
        let db = config.db();
        let out = request_transfer(
            config.clone(),
            TestEnv::ADMIN,
            request(&[("North Fund", "250")], TransferMethod::Payout),
        )
        .await
        .unwrap();
        let id = out.structure().unwrap().id.clone();
        db.review_transfer(TestEnv::ADMIN, &id, Review::Approve, None)
            .await
            .unwrap();

        // The payout went out but its id was never stored.
        let provider = TestProvider::new("PHP");
        let r = provider.create_recipient("North", "0917", "e_wallet").await.unwrap();
        let lost = provider
            .create_payout(&r.id, amt("250"), &format!("{id}:0"))
            .await
            .unwrap();

        let transfer = db.require_transfer(&id).await.unwrap();
        let provider_ref: &dyn Provider = &provider;
        let (done, _) = complete_transfer(db, Some(provider_ref), TestEnv::ADMIN, transfer)
            .await
            .unwrap();
        assert_eq!(done.status, TransferStatus::Completed);
        assert_eq!(provider.payouts(), vec![lost.clone()]);
        let stored = db.require_transfer(&id).await.unwrap();
        assert_eq!(stored.legs[0].payout_id.as_deref(), Some(lost.id.as_str()));
    }

    #[tokio::test]
    async fn test_approval_refuses_overdraw() {
        let env = TestEnv::new().await;
        let config = env.config();
        let out = request_transfer(
            config.clone(),
            TestEnv::FINANCE,
            request(&[("North Fund", "10000.01")], TransferMethod::Internal),
        )
        .await
        .unwrap();
        let id = out.structure().unwrap().id.clone();
        let err = approve_transfer(config.clone(), Mode::Testing, TestEnv::ADMIN, &id, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        let stored = config.db().require_transfer(&id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::Pending);
        assert_eq!(env.balance(&env.main_fund().id).await, amt(TestEnv::MAIN_OPENING));

        let out = reject_transfer(config, TestEnv::BISHOP, &id, Some("Too much"))
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().status, TransferStatus::Rejected);
    }
}
