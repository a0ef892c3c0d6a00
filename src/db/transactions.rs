use crate::db::{accounts, amount_col, amount_text, audit, branches, date_col, enum_col, Db};
use crate::error::Res;
use crate::finance::{filter_transactions, Filter};
use crate::model::{TransactionRecord, TransactionStatus};
use crate::utils;
use anyhow::{bail, Context};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

const SELECT_TRANSACTIONS: &str = "SELECT t.id, b.name AS branch, t.account_id, t.kind, \
    t.category, t.amount, t.date, t.description, t.donor, t.transfer_id, t.reference, t.status, \
    t.recorded_by FROM transactions t JOIN branches b ON b.id = t.branch_id";

const ORDER: &str = "ORDER BY t.date, t.created_at, t.rowid";

impl Db {
    /// Stores a record. When the record names an account, the record takes the account's branch
    /// and a completed record moves the account balance in the same SQLite transaction.
    pub(crate) async fn record_transaction(
        &self,
        actor: &str,
        mut record: TransactionRecord,
    ) -> Res<TransactionRecord> {
        let mut tx = self.pool().begin().await?;
        let branch_id = match record.account_id.clone() {
            Some(account_id) => {
                let account = accounts::find_account(&mut tx, &account_id)
                    .await?
                    .with_context(|| format!("Account '{account_id}' not found"))?;
                record.account_id = Some(account.id.clone());
                record.branch = account.branch.clone();
                account.branch_id
            }
            None => {
                let branch = branches::find_branch(&mut tx, &record.branch)
                    .await?
                    .with_context(|| format!("Branch '{}' not found", record.branch))?;
                record.branch = branch.name;
                branch.id
            }
        };
        insert(&mut tx, &branch_id, &record).await?;
        if record.status == TransactionStatus::Completed {
            if let Some(account_id) = &record.account_id {
                accounts::adjust_balance(&mut tx, account_id, record.balance_effect()).await?;
            }
        }
        audit::record(
            &mut tx,
            actor,
            "create",
            "transaction",
            &record.id,
            format!("{} {} {}", record.kind, record.category, record.amount),
        )
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Stores many records in one SQLite transaction. Either all of them are written or none.
    /// Each record's branch is looked up by name.
    pub(crate) async fn import_transactions(
        &self,
        actor: &str,
        records: &[TransactionRecord],
        source: &str,
    ) -> Res<usize> {
        let mut tx = self.pool().begin().await?;
        for (ix, record) in records.iter().enumerate() {
            let branch = branches::find_branch(&mut tx, &record.branch)
                .await?
                .with_context(|| {
                    format!("Row {}: branch '{}' not found", ix + 1, record.branch)
                })?;
            insert(&mut tx, &branch.id, record)
                .await
                .with_context(|| format!("Row {}", ix + 1))?;
        }
        audit::record(
            &mut tx,
            actor,
            "import",
            "transaction",
            source,
            format!("{} row{}", records.len(), utils::plural(records.len())),
        )
        .await?;
        tx.commit().await?;
        debug!("Imported {} transactions from {source}", records.len());
        Ok(records.len())
    }

    /// Completed records in date order, narrowed by `filter`. Pending online payments never
    /// appear here.
    pub(crate) async fn list_transactions(&self, filter: &Filter) -> Res<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_TRANSACTIONS} WHERE t.status = 'completed' {ORDER}"
        ))
        .fetch_all(self.pool())
        .await
        .context("Unable to read transactions")?;
        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Res<Vec<_>>>()?;
        Ok(filter_transactions(&records, filter))
    }

    pub(crate) async fn list_pending(&self) -> Res<Vec<TransactionRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_TRANSACTIONS} WHERE t.status = 'pending' {ORDER}"
        ))
        .fetch_all(self.pool())
        .await
        .context("Unable to read pending transactions")?;
        rows.iter().map(record_from_row).collect()
    }

    pub(crate) async fn get_transaction(&self, id: &str) -> Res<Option<TransactionRecord>> {
        let mut conn = self.pool().acquire().await?;
        get(&mut conn, id).await
    }

    /// Marks a pending online payment as received and credits its account.
    pub(crate) async fn confirm_pending(&self, actor: &str, id: &str) -> Res<TransactionRecord> {
        let mut tx = self.pool().begin().await?;
        let mut record = get(&mut tx, id)
            .await?
            .with_context(|| format!("Transaction '{id}' not found"))?;
        if record.status != TransactionStatus::Pending {
            bail!("Transaction '{id}' is already {}", record.status);
        }
        sqlx::query("UPDATE transactions SET status = 'completed' WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        record.status = TransactionStatus::Completed;
        if let Some(account_id) = &record.account_id {
            accounts::adjust_balance(&mut tx, account_id, record.balance_effect()).await?;
        }
        audit::record(
            &mut tx,
            actor,
            "confirm",
            "transaction",
            id,
            record.reference.clone().unwrap_or_default(),
        )
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Deletes a record entered in error and reverses its effect on the account balance. Rows
    /// written by a fund transfer cannot be voided.
    pub(crate) async fn void_transaction(&self, actor: &str, id: &str) -> Res<TransactionRecord> {
        let mut tx = self.pool().begin().await?;
        let record = get(&mut tx, id)
            .await?
            .with_context(|| format!("Transaction '{id}' not found"))?;
        if let Some(transfer_id) = &record.transfer_id {
            bail!("Transaction '{id}' belongs to transfer {transfer_id} and cannot be voided");
        }
        sqlx::query("DELETE FROM transactions WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if record.status == TransactionStatus::Completed {
            if let Some(account_id) = &record.account_id {
                accounts::adjust_balance(&mut tx, account_id, -record.balance_effect()).await?;
            }
        }
        audit::record(
            &mut tx,
            actor,
            "void",
            "transaction",
            id,
            format!("{} {} {}", record.kind, record.category, record.amount),
        )
        .await?;
        tx.commit().await?;
        Ok(record)
    }
}

pub(super) async fn insert(
    conn: &mut SqliteConnection,
    branch_id: &str,
    record: &TransactionRecord,
) -> Res<()> {
    sqlx::query(
        "INSERT INTO transactions (id, branch_id, account_id, kind, category, amount, date, \
        description, donor, transfer_id, reference, status, recorded_by, created_at) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(branch_id)
    .bind(&record.account_id)
    .bind(record.kind.as_str())
    .bind(&record.category)
    .bind(amount_text(record.amount))
    .bind(record.date.format("%Y-%m-%d").to_string())
    .bind(&record.description)
    .bind(&record.donor)
    .bind(&record.transfer_id)
    .bind(&record.reference)
    .bind(record.status.to_string())
    .bind(&record.recorded_by)
    .bind(utils::now())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Unable to save transaction {}", record.id))?;
    Ok(())
}

async fn get(conn: &mut SqliteConnection, id: &str) -> Res<Option<TransactionRecord>> {
    let row = sqlx::query(&format!("{SELECT_TRANSACTIONS} WHERE t.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

pub(super) fn record_from_row(row: &SqliteRow) -> Res<TransactionRecord> {
    Ok(TransactionRecord {
        id: row.try_get("id")?,
        amount: amount_col(row, "amount")?,
        kind: enum_col(row, "kind")?,
        category: row.try_get("category")?,
        branch: row.try_get("branch")?,
        date: date_col(row, "date")?,
        recorded_by: row.try_get("recorded_by")?,
        description: row.try_get("description")?,
        account_id: row.try_get("account_id")?,
        donor: row.try_get("donor")?,
        transfer_id: row.try_get("transfer_id")?,
        reference: row.try_get("reference")?,
        status: enum_col(row, "status")?,
    })
}
