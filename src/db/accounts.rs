use crate::db::{amount_col, amount_text, audit, enum_col, friendly, transactions, Db};
use crate::error::Res;
use crate::model::{
    AccountKind, Amount, BalanceDrift, FinanceAccount, TransactionKind, TransactionRecord,
};
use crate::utils;
use anyhow::{bail, Context};
use chrono::Local;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::BTreeMap;

/// Category of the income row that carries an account's starting balance.
pub(crate) const OPENING_BALANCE: &str = "Opening Balance";

const SELECT_ACCOUNTS: &str = "SELECT a.id, a.branch_id, b.name AS branch, a.ministry_id, a.name, \
    a.kind, a.account_number, a.balance, a.created_at \
    FROM accounts a JOIN branches b ON b.id = a.branch_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NewAccount {
    pub(crate) branch_id: String,
    pub(crate) ministry_id: Option<String>,
    pub(crate) name: String,
    pub(crate) kind: AccountKind,
    pub(crate) account_number: String,
    pub(crate) opening_balance: Amount,
}

impl Db {
    /// Creates an account. A non-zero opening balance is written to the ledger as an
    /// `Opening Balance` row so that `recompute_balances` agrees with the stored balance.
    pub(crate) async fn add_account(&self, actor: &str, new: NewAccount) -> Res<FinanceAccount> {
        let name = new.name.trim();
        if name.is_empty() {
            bail!("An account needs a name");
        }
        let id = utils::new_id("acc");
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO accounts \
            (id, branch_id, ministry_id, name, kind, account_number, balance, created_at) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new.branch_id)
        .bind(&new.ministry_id)
        .bind(name)
        .bind(new.kind.to_string())
        .bind(new.account_number.trim())
        .bind(amount_text(new.opening_balance))
        .bind(utils::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| friendly(e, &format!("Account '{name}'")))?;

        let account = find_account(&mut tx, &id)
            .await?
            .context("The new account could not be read back")?;

        if !new.opening_balance.is_zero() {
            let opening = TransactionRecord::new(
                utils::new_id("txn"),
                TransactionKind::Income,
                new.opening_balance,
                OPENING_BALANCE,
                &account.branch,
                Local::now().date_naive(),
                actor,
            )
            .with_account(&account.id);
            transactions::insert(&mut tx, &account.branch_id, &opening).await?;
        }

        audit::record(
            &mut tx,
            actor,
            "create",
            "account",
            &account.id,
            format!("{} opening balance {}", account.label(), account.balance),
        )
        .await?;
        tx.commit().await?;
        Ok(account)
    }

    /// Lists accounts, optionally limited to one branch id.
    pub(crate) async fn list_accounts(&self, branch_id: Option<&str>) -> Res<Vec<FinanceAccount>> {
        let rows = sqlx::query(&format!(
            "{SELECT_ACCOUNTS} WHERE (?1 IS NULL OR a.branch_id = ?1) ORDER BY b.name, a.name"
        ))
        .bind(branch_id)
        .fetch_all(self.pool())
        .await
        .context("Unable to list accounts")?;
        rows.iter().map(account_from_row).collect()
    }

    pub(crate) async fn find_account(&self, key: &str) -> Res<Option<FinanceAccount>> {
        let mut conn = self.pool().acquire().await?;
        find_account(&mut conn, key).await
    }

    pub(crate) async fn require_account(&self, key: &str) -> Res<FinanceAccount> {
        self.find_account(key)
            .await?
            .with_context(|| format!("Account '{key}' not found"))
    }

    /// Rebuilds every stored balance from the completed ledger rows and returns the accounts
    /// whose stored balance had drifted.
    pub(crate) async fn recompute_balances(&self, actor: &str) -> Res<Vec<BalanceDrift>> {
        let mut tx = self.pool().begin().await?;
        let rows = sqlx::query(&format!("{SELECT_ACCOUNTS} ORDER BY b.name, a.name"))
            .fetch_all(&mut *tx)
            .await?;
        let accounts = rows
            .iter()
            .map(account_from_row)
            .collect::<Res<Vec<_>>>()?;

        let mut computed: BTreeMap<String, Amount> = BTreeMap::new();
        let ledger = sqlx::query(
            "SELECT account_id, kind, amount FROM transactions \
            WHERE account_id IS NOT NULL AND status = 'completed'",
        )
        .fetch_all(&mut *tx)
        .await?;
        for row in &ledger {
            let account_id: String = row.try_get("account_id")?;
            let kind: TransactionKind = enum_col(row, "kind")?;
            let amount = amount_col(row, "amount")?;
            let entry = computed.entry(account_id).or_insert(Amount::ZERO);
            match kind {
                TransactionKind::Income => *entry += amount,
                TransactionKind::Expense => *entry -= amount,
            }
        }

        let mut drifts = Vec::new();
        for account in accounts {
            let balance = computed.get(&account.id).copied().unwrap_or(Amount::ZERO);
            if balance != account.balance {
                set_balance(&mut tx, &account.id, balance).await?;
                drifts.push(BalanceDrift {
                    account_id: account.id.clone(),
                    account: account.label(),
                    stored: account.balance,
                    computed: balance,
                    drift: balance - account.balance,
                });
            }
        }
        audit::record(
            &mut tx,
            actor,
            "recompute",
            "account",
            "*",
            format!("{} account balance{} corrected", drifts.len(), utils::plural(drifts.len())),
        )
        .await?;
        tx.commit().await?;
        Ok(drifts)
    }
}

/// Finds an account by id, or by name when exactly one account carries that name.
pub(super) async fn find_account(
    conn: &mut SqliteConnection,
    key: &str,
) -> Res<Option<FinanceAccount>> {
    let key = key.trim();
    let rows = sqlx::query(&format!(
        "{SELECT_ACCOUNTS} WHERE a.id = ?1 OR a.name = ?1 COLLATE NOCASE ORDER BY a.id = ?1 DESC"
    ))
    .bind(key)
    .fetch_all(&mut *conn)
    .await
    .context("Unable to look up account")?;
    let accounts = rows
        .iter()
        .map(account_from_row)
        .collect::<Res<Vec<_>>>()?;
    match accounts.as_slice() {
        [] => Ok(None),
        [first, ..] if first.id == key => Ok(Some(first.clone())),
        [only] => Ok(Some(only.clone())),
        many => bail!(
            "{} accounts are named '{key}', use the account id instead: {}",
            many.len(),
            many.iter().map(|a| a.id.as_str()).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Loads the given accounts keyed by id. Fails when any of them does not exist.
pub(super) async fn load_accounts<'a>(
    conn: &mut SqliteConnection,
    ids: impl IntoIterator<Item = &'a str>,
) -> Res<BTreeMap<String, FinanceAccount>> {
    let mut accounts = BTreeMap::new();
    for id in ids {
        if accounts.contains_key(id) {
            continue;
        }
        let row = sqlx::query(&format!("{SELECT_ACCOUNTS} WHERE a.id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        let account = match row {
            Some(row) => account_from_row(&row)?,
            None => bail!("Account '{id}' not found"),
        };
        accounts.insert(account.id.clone(), account);
    }
    Ok(accounts)
}

/// Adds `delta` to the stored balance and returns the new balance.
pub(super) async fn adjust_balance(
    conn: &mut SqliteConnection,
    account_id: &str,
    delta: Amount,
) -> Res<Amount> {
    let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?
        .with_context(|| format!("Account '{account_id}' not found"))?;
    let balance = amount_col(&row, "balance")? + delta;
    set_balance(conn, account_id, balance).await?;
    Ok(balance)
}

pub(super) async fn set_balance(
    conn: &mut SqliteConnection,
    account_id: &str,
    balance: Amount,
) -> Res<()> {
    sqlx::query("UPDATE accounts SET balance = ? WHERE id = ?")
        .bind(amount_text(balance))
        .bind(account_id)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Unable to update the balance of account {account_id}"))?;
    Ok(())
}

fn account_from_row(row: &SqliteRow) -> Res<FinanceAccount> {
    Ok(FinanceAccount {
        id: row.try_get("id")?,
        branch_id: row.try_get("branch_id")?,
        branch: row.try_get("branch")?,
        ministry_id: row.try_get("ministry_id")?,
        name: row.try_get("name")?,
        kind: enum_col(row, "kind")?,
        account_number: row.try_get("account_number")?,
        balance: amount_col(row, "balance")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;

    const ADMIN: &str = "admin@example.org";

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    async fn setup(dir: &TempDir) -> (Db, String) {
        let db = Db::init(dir.path().join("ledger.sqlite")).await.unwrap();
        let branch = db.add_branch(ADMIN, "Main", "").await.unwrap();
        (db, branch.id)
    }

    fn new_account(branch_id: &str, name: &str, opening: &str) -> NewAccount {
        NewAccount {
            branch_id: branch_id.into(),
            ministry_id: None,
            name: name.into(),
            kind: AccountKind::Bank,
            account_number: "0001".into(),
            opening_balance: amt(opening),
        }
    }

    #[tokio::test]
    async fn test_add_account_with_opening_balance() {
        let dir = TempDir::new().unwrap();
        let (db, branch_id) = setup(&dir).await;
        let account = db
            .add_account(ADMIN, new_account(&branch_id, "General Fund", "2500"))
            .await
            .unwrap();
        assert_eq!(account.balance, amt("2500"));
        assert_eq!(account.branch, "Main");

        let rows = db.list_transactions(&Default::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].category, OPENING_BALANCE);

        // The opening row keeps the ledger consistent with the stored balance.
        assert!(db.recompute_balances(ADMIN).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_account_by_id_or_unique_name() {
        let dir = TempDir::new().unwrap();
        let (db, branch_id) = setup(&dir).await;
        let north = db.add_branch(ADMIN, "North", "").await.unwrap();
        let a = db
            .add_account(ADMIN, new_account(&branch_id, "General Fund", "0"))
            .await
            .unwrap();
        db.add_account(ADMIN, new_account(&branch_id, "Building Fund", "0"))
            .await
            .unwrap();
        db.add_account(ADMIN, new_account(&north.id, "General Fund", "0"))
            .await
            .unwrap();

        assert_eq!(db.require_account(&a.id).await.unwrap().id, a.id);
        assert_eq!(
            db.require_account("building fund").await.unwrap().name,
            "Building Fund"
        );
        let err = db.find_account("General Fund").await.unwrap_err();
        assert!(err.to_string().contains("2 accounts"), "{err}");
        assert!(db.find_account("Missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recompute_reports_drift() {
        let dir = TempDir::new().unwrap();
        let (db, branch_id) = setup(&dir).await;
        let account = db
            .add_account(ADMIN, new_account(&branch_id, "General Fund", "100"))
            .await
            .unwrap();
        {
            let mut conn = db.pool().acquire().await.unwrap();
            set_balance(&mut conn, &account.id, amt("75")).await.unwrap();
        }
        let drifts = db.recompute_balances(ADMIN).await.unwrap();
        assert_eq!(drifts.len(), 1);
        assert_eq!(drifts[0].stored, amt("75"));
        assert_eq!(drifts[0].computed, amt("100"));
        assert_eq!(drifts[0].drift, amt("25"));
        assert_eq!(
            db.require_account(&account.id).await.unwrap().balance,
            amt("100")
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_in_branch() {
        let dir = TempDir::new().unwrap();
        let (db, branch_id) = setup(&dir).await;
        db.add_account(ADMIN, new_account(&branch_id, "Cash Box", "0"))
            .await
            .unwrap();
        let err = db
            .add_account(ADMIN, new_account(&branch_id, "cash box", "0"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");
    }
}
