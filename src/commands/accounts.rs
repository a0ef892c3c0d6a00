use crate::args::AddAccountArgs;
use crate::commands::{authorize, Out};
use crate::db::NewAccount;
use crate::error::{ErrorType, IntoResult};
use crate::finance::format_currency;
use crate::model::{BalanceDrift, FinanceAccount, Permission};
use crate::utils::plural;
use crate::{Config, Error, Result};

/// Creates a finance account. A non-zero opening balance is written to the ledger.
pub async fn add_account(
    config: Config,
    actor: &str,
    args: AddAccountArgs,
) -> Result<Out<FinanceAccount>> {
    let me = authorize(&config, actor, Permission::ManageAccounts).await?;
    if args.opening_balance.is_negative() {
        return Err(Error::msg(
            ErrorType::Validation,
            "The opening balance cannot be negative",
        ));
    }
    let db = config.db();
    let branch = db
        .require_branch(&args.branch)
        .await
        .pub_result(ErrorType::Database)?;
    let ministry_id = match &args.ministry {
        Some(key) => {
            let ministry = db
                .find_ministry(&branch.id, key)
                .await
                .pub_result(ErrorType::Database)?
                .ok_or_else(|| {
                    Error::msg(
                        ErrorType::Validation,
                        format!("Branch {} has no ministry '{key}'", branch.name),
                    )
                })?;
            Some(ministry.id)
        }
        None => None,
    };
    let account = db
        .add_account(
            &me.email,
            NewAccount {
                branch_id: branch.id,
                ministry_id,
                name: args.name,
                kind: args.kind,
                account_number: args.account_number,
                opening_balance: args.opening_balance,
            },
        )
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Added account {} with balance {}",
            account.label(),
            format_currency(account.balance, config.currency())
        ),
        account,
    ))
}

pub async fn list_accounts(
    config: Config,
    actor: &str,
    branch: Option<&str>,
) -> Result<Out<Vec<FinanceAccount>>> {
    authorize(&config, actor, Permission::ViewFinances).await?;
    let db = config.db();
    let branch_id = match branch {
        Some(key) => Some(
            db.require_branch(key)
                .await
                .pub_result(ErrorType::Database)?
                .id,
        ),
        None => None,
    };
    let accounts = db
        .list_accounts(branch_id.as_deref())
        .await
        .pub_result(ErrorType::Database)?;
    let mut message = format!("{} account{}", accounts.len(), plural(accounts.len()));
    for a in &accounts {
        message.push_str(&format!(
            "\n  {} ({}, {}): {}",
            a.label(),
            a.id,
            a.kind,
            format_currency(a.balance, config.currency())
        ));
    }
    Ok(Out::new(message, accounts))
}

/// Rewrites every stored balance from the completed ledger and reports the accounts that drifted.
pub async fn recompute_balances(config: Config, actor: &str) -> Result<Out<Vec<BalanceDrift>>> {
    let me = authorize(&config, actor, Permission::ManageAccounts).await?;
    let drifts = config
        .db()
        .recompute_balances(&me.email)
        .await
        .pub_result(ErrorType::Database)?;
    if drifts.is_empty() {
        return Ok(Out::new("All balances agree with the ledger", drifts));
    }
    let mut message = format!("Corrected {} balance{}", drifts.len(), plural(drifts.len()));
    for d in &drifts {
        message.push_str(&format!(
            "\n  {}: {} -> {}",
            d.account,
            format_currency(d.stored, config.currency()),
            format_currency(d.computed, config.currency())
        ));
    }
    Ok(Out::new(message, drifts))
}
