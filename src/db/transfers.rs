use crate::db::{accounts, amount_col, amount_text, audit, enum_col, transactions, Db};
use crate::error::Res;
use crate::ledger;
use crate::model::{
    Amount, TransactionRecord, TransferLeg, TransferMethod, TransferRequest, TransferStatus,
};
use crate::utils;
use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

const SELECT_TRANSFERS: &str = "SELECT id, source_account_id, amount, purpose, method, status, \
    requested_by, reviewed_by, review_note, created_at, updated_at FROM transfers";

/// A transfer as requested. Accounts may be given by id or by unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NewTransfer {
    pub(crate) source: String,
    pub(crate) destinations: Vec<(String, Amount)>,
    pub(crate) purpose: String,
    pub(crate) method: TransferMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Review {
    Approve,
    Reject,
}

impl Db {
    /// Stores a new `Pending` transfer and its legs.
    pub(crate) async fn request_transfer(
        &self,
        actor: &str,
        new: NewTransfer,
    ) -> Res<TransferRequest> {
        let mut tx = self.pool().begin().await?;
        let source = accounts::find_account(&mut tx, &new.source)
            .await?
            .with_context(|| format!("Source account '{}' not found", new.source))?;

        let mut legs = Vec::with_capacity(new.destinations.len());
        for (position, (key, amount)) in new.destinations.iter().enumerate() {
            let account = accounts::find_account(&mut tx, key)
                .await?
                .with_context(|| format!("Destination account '{key}' not found"))?;
            legs.push(TransferLeg {
                position: position as i64,
                account_id: account.id,
                amount: *amount,
                payout_id: None,
            });
        }

        let now = utils::now();
        let transfer = TransferRequest {
            id: utils::new_id("trf"),
            source_account_id: source.id.clone(),
            amount: legs.iter().map(|l| l.amount).sum(),
            legs,
            purpose: new.purpose.trim().to_string(),
            method: new.method,
            status: TransferStatus::Pending,
            requested_by: actor.to_string(),
            reviewed_by: None,
            review_note: None,
            created_at: now.clone(),
            updated_at: now,
        };
        ledger::validate(&transfer)?;

        sqlx::query(
            "INSERT INTO transfers (id, source_account_id, amount, purpose, method, status, \
            requested_by, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&transfer.id)
        .bind(&transfer.source_account_id)
        .bind(amount_text(transfer.amount))
        .bind(&transfer.purpose)
        .bind(transfer.method.to_string())
        .bind(transfer.status.to_string())
        .bind(&transfer.requested_by)
        .bind(&transfer.created_at)
        .bind(&transfer.updated_at)
        .execute(&mut *tx)
        .await
        .context("Unable to save the transfer")?;
        for leg in &transfer.legs {
            sqlx::query(
                "INSERT INTO transfer_legs (transfer_id, position, account_id, amount) \
                VALUES (?, ?, ?, ?)",
            )
            .bind(&transfer.id)
            .bind(leg.position)
            .bind(&leg.account_id)
            .bind(amount_text(leg.amount))
            .execute(&mut *tx)
            .await
            .context("Unable to save a transfer destination")?;
        }
        audit::record(
            &mut tx,
            actor,
            "request",
            "transfer",
            &transfer.id,
            format!(
                "{} from {} to {} account{}",
                transfer.amount,
                source.label(),
                transfer.legs.len(),
                utils::plural(transfer.legs.len())
            ),
        )
        .await?;
        tx.commit().await?;
        Ok(transfer)
    }

    pub(crate) async fn get_transfer(&self, id: &str) -> Res<Option<TransferRequest>> {
        let mut conn = self.pool().acquire().await?;
        get(&mut conn, id).await
    }

    pub(crate) async fn require_transfer(&self, id: &str) -> Res<TransferRequest> {
        self.get_transfer(id)
            .await?
            .with_context(|| format!("Transfer '{id}' not found"))
    }

    /// Transfers newest first, optionally limited to one status.
    pub(crate) async fn list_transfers(
        &self,
        status: Option<TransferStatus>,
    ) -> Res<Vec<TransferRequest>> {
        let mut conn = self.pool().acquire().await?;
        let rows = sqlx::query(&format!(
            "{SELECT_TRANSFERS} WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC, id"
        ))
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&mut *conn)
        .await
        .context("Unable to list transfers")?;
        let mut transfers = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut transfer = transfer_from_row(row)?;
            transfer.legs = legs(&mut conn, &transfer.id).await?;
            transfers.push(transfer);
        }
        Ok(transfers)
    }

    /// Moves a `Pending` transfer to `Approved` or `Rejected`. Approval first checks that the
    /// transfer could be reconciled against the current balances, so a transfer the source cannot
    /// cover is never approved.
    pub(crate) async fn review_transfer(
        &self,
        actor: &str,
        id: &str,
        review: Review,
        note: Option<&str>,
    ) -> Res<TransferRequest> {
        let mut tx = self.pool().begin().await?;
        let mut transfer = get(&mut tx, id)
            .await?
            .with_context(|| format!("Transfer '{id}' not found"))?;
        if transfer.status != TransferStatus::Pending {
            bail!("Transfer '{id}' is {} and can no longer be reviewed", transfer.status);
        }

        let status = match review {
            Review::Approve => {
                let accounts = accounts::load_accounts(&mut tx, account_ids(&transfer)).await?;
                ledger::plan_reconciliation(&transfer, &accounts, Local::now().date_naive(), actor)?;
                TransferStatus::Approved
            }
            Review::Reject => TransferStatus::Rejected,
        };

        transfer.status = status;
        transfer.reviewed_by = Some(actor.to_string());
        transfer.review_note = note.map(String::from).filter(|n| !n.trim().is_empty());
        transfer.updated_at = utils::now();
        sqlx::query(
            "UPDATE transfers SET status = ?, reviewed_by = ?, review_note = ?, updated_at = ? \
            WHERE id = ?",
        )
        .bind(transfer.status.to_string())
        .bind(&transfer.reviewed_by)
        .bind(&transfer.review_note)
        .bind(&transfer.updated_at)
        .bind(&transfer.id)
        .execute(&mut *tx)
        .await?;
        audit::record(
            &mut tx,
            actor,
            match review {
                Review::Approve => "approve",
                Review::Reject => "reject",
            },
            "transfer",
            &transfer.id,
            transfer.review_note.clone().unwrap_or_default(),
        )
        .await?;
        tx.commit().await?;
        Ok(transfer)
    }

    /// Stores the payment provider's payout id for one leg, so that a resumed transfer never
    /// pays the same leg twice.
    pub(crate) async fn set_leg_payout(
        &self,
        actor: &str,
        transfer_id: &str,
        position: i64,
        payout_id: &str,
    ) -> Res<()> {
        let mut tx = self.pool().begin().await?;
        let updated = sqlx::query(
            "UPDATE transfer_legs SET payout_id = ? WHERE transfer_id = ? AND position = ? \
            AND payout_id IS NULL",
        )
        .bind(payout_id)
        .bind(transfer_id)
        .bind(position)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            bail!("Leg {position} of transfer '{transfer_id}' is missing or already paid");
        }
        audit::record(
            &mut tx,
            actor,
            "payout",
            "transfer",
            transfer_id,
            format!("leg {position}: {payout_id}"),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fails when `id` could not be reconciled against the current balances. Nothing is
    /// written.
    pub(crate) async fn check_transfer(&self, id: &str, date: NaiveDate, actor: &str) -> Res<()> {
        let mut conn = self.pool().acquire().await?;
        let transfer = get(&mut conn, id)
            .await?
            .with_context(|| format!("Transfer '{id}' not found"))?;
        let accounts = accounts::load_accounts(&mut conn, account_ids(&transfer)).await?;
        ledger::plan_reconciliation(&transfer, &accounts, date, actor)?;
        Ok(())
    }

    /// Completes an `Approved` transfer: writes the paired ledger rows, rewrites the balances,
    /// and marks the transfer `Completed`. All of it happens in one SQLite transaction; on any
    /// error nothing is written.
    pub(crate) async fn reconcile_transfer(
        &self,
        actor: &str,
        id: &str,
        date: NaiveDate,
    ) -> Res<(TransferRequest, Vec<TransactionRecord>)> {
        let mut tx = self.pool().begin().await?;
        let mut transfer = get(&mut tx, id)
            .await?
            .with_context(|| format!("Transfer '{id}' not found"))?;
        if transfer.status != TransferStatus::Approved {
            bail!(
                "Transfer '{id}' is {}, only approved transfers can be completed",
                transfer.status
            );
        }
        if transfer.method == TransferMethod::Payout && transfer.unpaid_legs().next().is_some() {
            bail!("Transfer '{id}' still has legs without a payout");
        }

        let accounts = accounts::load_accounts(&mut tx, account_ids(&transfer)).await?;
        let plan = ledger::plan_reconciliation(&transfer, &accounts, date, actor)?;

        for record in &plan.records {
            let account_id = record
                .account_id
                .as_deref()
                .context("A transfer row has no account")?;
            let branch_id = accounts
                .get(account_id)
                .map(|a| a.branch_id.as_str())
                .with_context(|| format!("Account '{account_id}' not found"))?;
            transactions::insert(&mut tx, branch_id, record).await?;
        }
        for (account_id, balance) in &plan.balances {
            accounts::set_balance(&mut tx, account_id, *balance).await?;
        }

        transfer.status = TransferStatus::Completed;
        transfer.updated_at = utils::now();
        sqlx::query("UPDATE transfers SET status = ?, updated_at = ? WHERE id = ?")
            .bind(transfer.status.to_string())
            .bind(&transfer.updated_at)
            .bind(&transfer.id)
            .execute(&mut *tx)
            .await?;
        audit::record(
            &mut tx,
            actor,
            "complete",
            "transfer",
            &transfer.id,
            format!("{} ledger rows", plan.records.len()),
        )
        .await?;
        tx.commit().await?;
        info!("Transfer {} completed", transfer.id);
        Ok((transfer, plan.records))
    }
}

fn account_ids(transfer: &TransferRequest) -> impl Iterator<Item = &str> {
    std::iter::once(transfer.source_account_id.as_str())
        .chain(transfer.legs.iter().map(|l| l.account_id.as_str()))
}

async fn get(conn: &mut SqliteConnection, id: &str) -> Res<Option<TransferRequest>> {
    let row = sqlx::query(&format!("{SELECT_TRANSFERS} WHERE id = ?"))
        .bind(id.trim())
        .fetch_optional(&mut *conn)
        .await
        .context("Unable to read transfer")?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut transfer = transfer_from_row(&row)?;
    transfer.legs = legs(conn, &transfer.id).await?;
    Ok(Some(transfer))
}

async fn legs(conn: &mut SqliteConnection, transfer_id: &str) -> Res<Vec<TransferLeg>> {
    let rows = sqlx::query(
        "SELECT position, account_id, amount, payout_id FROM transfer_legs \
        WHERE transfer_id = ? ORDER BY position",
    )
    .bind(transfer_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(TransferLeg {
                position: row.try_get("position")?,
                account_id: row.try_get("account_id")?,
                amount: amount_col(row, "amount")?,
                payout_id: row.try_get("payout_id")?,
            })
        })
        .collect()
}

fn transfer_from_row(row: &SqliteRow) -> Res<TransferRequest> {
    Ok(TransferRequest {
        id: row.try_get("id")?,
        source_account_id: row.try_get("source_account_id")?,
        legs: Vec::new(),
        amount: amount_col(row, "amount")?,
        purpose: row.try_get("purpose")?,
        method: enum_col(row, "method")?,
        status: enum_col(row, "status")?,
        requested_by: row.try_get("requested_by")?,
        reviewed_by: row.try_get("reviewed_by")?,
        review_note: row.try_get("review_note")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
