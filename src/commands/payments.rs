//! Online giving: a checkout is recorded as a `Pending` income transaction keyed by the provider's
//! source id, and only counts once it is confirmed.

use crate::args::CheckoutArgs;
use crate::commands::{authorize, Out};
use crate::error::{ErrorType, IntoResult};
use crate::finance::format_currency;
use crate::model::{Permission, TransactionKind, TransactionRecord, TransactionStatus};
use crate::payments::{self, Source};
use crate::utils::{self, plural};
use crate::{Config, Error, Mode, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

/// A created checkout and the pending transaction that waits for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub source: Source,
    pub transaction: TransactionRecord,
}

/// Creates a checkout with the payment provider and records a pending gift to `args.account`.
/// Requires `RecordTransactions`.
pub async fn checkout(
    config: Config,
    mode: Mode,
    actor: &str,
    args: CheckoutArgs,
) -> Result<Out<Checkout>> {
    let me = authorize(&config, actor, Permission::RecordTransactions).await?;
    if !args.amount.is_positive() {
        return Err(Error::msg(
            ErrorType::Validation,
            "A checkout amount must be greater than zero",
        ));
    }
    let account = config
        .db()
        .require_account(&args.account)
        .await
        .pub_result(ErrorType::Database)?;
    let description = if args.description.trim().is_empty() {
        format!("{} for {}", args.category, config.church_name())
    } else {
        args.description.trim().to_string()
    };

    let provider = payments::provider(&config, mode)
        .await
        .pub_result(ErrorType::Payment)?;
    let source = provider
        .create_source(args.amount, args.method, &description)
        .await
        .pub_result(ErrorType::Payment)?;

    let mut record = TransactionRecord::new(
        utils::new_id("txn"),
        TransactionKind::Income,
        args.amount,
        args.category.trim(),
        &account.branch,
        Local::now().date_naive(),
        &me.email,
    )
    .with_account(&account.id)
    .with_reference(&source.id)
    .with_description(description)
    .with_status(TransactionStatus::Pending);
    if let Some(donor) = args.donor.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        record = record.with_donor(donor);
    }
    let transaction = config
        .db()
        .record_transaction(&me.email, record)
        .await
        .pub_result(ErrorType::Database)?;

    Ok(Out::new(
        format!(
            "Checkout for {} created. Pay at {} then confirm transaction {}",
            format_currency(args.amount, config.currency()),
            source.checkout_url,
            transaction.id
        ),
        Checkout {
            source,
            transaction,
        },
    ))
}

/// Marks a pending gift as paid and credits its account.
pub async fn confirm_payment(
    config: Config,
    actor: &str,
    transaction_id: &str,
) -> Result<Out<TransactionRecord>> {
    let me = authorize(&config, actor, Permission::RecordTransactions).await?;
    let record = config
        .db()
        .confirm_pending(&me.email, transaction_id)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Confirmed {} of {}",
            record.id,
            format_currency(record.amount, config.currency())
        ),
        record,
    ))
}

pub async fn list_pending(config: Config, actor: &str) -> Result<Out<Vec<TransactionRecord>>> {
    authorize(&config, actor, Permission::ViewFinances).await?;
    let pending = config
        .db()
        .list_pending()
        .await
        .pub_result(ErrorType::Database)?;
    let mut message = format!("{} pending payment{}", pending.len(), plural(pending.len()));
    for r in &pending {
        message.push_str(&format!(
            "\n  {} {} {} {}",
            r.id,
            r.date,
            format_currency(r.amount, config.currency()),
            r.reference.as_deref().unwrap_or_default()
        ));
    }
    Ok(Out::new(message, pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::SourceKind;
    use crate::test::{amt, TestEnv};

    fn args(amount: &str) -> CheckoutArgs {
        CheckoutArgs {
            account: "North Fund".into(),
            amount: amt(amount),
            method: SourceKind::GrabPay,
            category: "Offering".into(),
            donor: Some("Online donor".into()),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_checkout_then_confirm() {
        let env = TestEnv::new().await;
        let config = env.config();
        let out = checkout(config.clone(), Mode::Testing, TestEnv::FINANCE, args("250"))
            .await
            .unwrap();
        let created = out.structure().unwrap().clone();
        assert_eq!(created.transaction.status, TransactionStatus::Pending);
        assert_eq!(created.transaction.reference.as_deref(), Some(created.source.id.as_str()));
        assert!(out.message().contains(&created.source.checkout_url));

        // Pending gifts do not count yet.
        assert_eq!(env.balance(&env.north_fund().id).await, amt(TestEnv::NORTH_OPENING));
        let listed = config.db().list_transactions(&Default::default()).await.unwrap();
        assert!(listed.iter().all(|r| r.id != created.transaction.id));
        let out = list_pending(config.clone(), TestEnv::BISHOP).await.unwrap();
        assert_eq!(out.structure().unwrap().len(), 1);

        confirm_payment(config.clone(), TestEnv::FINANCE, &created.transaction.id)
            .await
            .unwrap();
        assert_eq!(env.balance(&env.north_fund().id).await, amt("2250"));
        let out = list_pending(config.clone(), TestEnv::BISHOP).await.unwrap();
        assert!(out.structure().unwrap().is_empty());

        // A second confirmation is refused.
        assert!(confirm_payment(config, TestEnv::FINANCE, &created.transaction.id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_checkout_validation() {
        let env = TestEnv::new().await;
        let err = checkout(env.config(), Mode::Testing, TestEnv::FINANCE, args("0"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        let err = checkout(env.config(), Mode::Testing, TestEnv::BISHOP, args("10"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Permission);
        let err = checkout(env.config(), Mode::Live, TestEnv::FINANCE, args("10"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Payment);
    }
}
