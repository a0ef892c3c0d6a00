use crate::db::{audit, friendly, Db};
use crate::error::Res;
use crate::model::{Branch, Ministry};
use crate::utils;
use anyhow::{bail, Context};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

impl Db {
    pub(crate) async fn add_branch(&self, actor: &str, name: &str, location: &str) -> Res<Branch> {
        let name = name.trim();
        if name.is_empty() {
            bail!("A branch needs a name");
        }
        let branch = Branch {
            id: utils::new_id("br"),
            name: name.to_string(),
            location: location.trim().to_string(),
            created_at: utils::now(),
        };
        let mut tx = self.pool().begin().await?;
        sqlx::query("INSERT INTO branches (id, name, location, created_at) VALUES (?, ?, ?, ?)")
            .bind(&branch.id)
            .bind(&branch.name)
            .bind(&branch.location)
            .bind(&branch.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| friendly(e, &format!("Branch '{name}'")))?;
        audit::record(&mut tx, actor, "create", "branch", &branch.id, &branch.name).await?;
        tx.commit().await?;
        Ok(branch)
    }

    pub(crate) async fn list_branches(&self) -> Res<Vec<Branch>> {
        let rows = sqlx::query("SELECT id, name, location, created_at FROM branches ORDER BY name")
            .fetch_all(self.pool())
            .await
            .context("Unable to list branches")?;
        rows.iter().map(branch_from_row).collect()
    }

    /// Finds a branch by id or by name.
    pub(crate) async fn find_branch(&self, key: &str) -> Res<Option<Branch>> {
        let mut conn = self.pool().acquire().await?;
        find_branch(&mut conn, key).await
    }

    pub(crate) async fn require_branch(&self, key: &str) -> Res<Branch> {
        self.find_branch(key)
            .await?
            .with_context(|| format!("Branch '{key}' not found"))
    }

    pub(crate) async fn update_branch(
        &self,
        actor: &str,
        key: &str,
        name: Option<&str>,
        location: Option<&str>,
    ) -> Res<Branch> {
        let mut tx = self.pool().begin().await?;
        let current = find_branch(&mut tx, key)
            .await?
            .with_context(|| format!("Branch '{key}' not found"))?;
        let updated = Branch {
            name: name.map(|n| n.trim().to_string()).unwrap_or(current.name),
            location: location
                .map(|l| l.trim().to_string())
                .unwrap_or(current.location),
            ..current
        };
        if updated.name.is_empty() {
            bail!("A branch needs a name");
        }
        sqlx::query("UPDATE branches SET name = ?, location = ? WHERE id = ?")
            .bind(&updated.name)
            .bind(&updated.location)
            .bind(&updated.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| friendly(e, &format!("Branch '{}'", updated.name)))?;
        audit::record(
            &mut tx,
            actor,
            "update",
            "branch",
            &updated.id,
            format!("{} ({})", updated.name, updated.location),
        )
        .await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Removes a branch that owns no accounts and no transactions. Its ministries go with it.
    pub(crate) async fn remove_branch(&self, actor: &str, key: &str) -> Res<Branch> {
        let mut tx = self.pool().begin().await?;
        let branch = find_branch(&mut tx, key)
            .await?
            .with_context(|| format!("Branch '{key}' not found"))?;

        let (accounts,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE branch_id = ?")
            .bind(&branch.id)
            .fetch_one(&mut *tx)
            .await?;
        let (transactions,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE branch_id = ?")
                .bind(&branch.id)
                .fetch_one(&mut *tx)
                .await?;
        if accounts > 0 || transactions > 0 {
            bail!(
                "Branch '{}' still owns {accounts} account{} and {transactions} transaction{}. \
                Move or remove them first",
                branch.name,
                utils::plural(accounts as usize),
                utils::plural(transactions as usize),
            );
        }

        sqlx::query("DELETE FROM branches WHERE id = ?")
            .bind(&branch.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| friendly(e, &format!("Branch '{}'", branch.name)))?;
        audit::record(&mut tx, actor, "delete", "branch", &branch.id, &branch.name).await?;
        tx.commit().await?;
        Ok(branch)
    }

    pub(crate) async fn add_ministry(
        &self,
        actor: &str,
        branch_id: &str,
        name: &str,
        description: &str,
    ) -> Res<Ministry> {
        let name = name.trim();
        if name.is_empty() {
            bail!("A ministry needs a name");
        }
        let ministry = Ministry {
            id: utils::new_id("min"),
            branch_id: branch_id.to_string(),
            name: name.to_string(),
            description: description.trim().to_string(),
            created_at: utils::now(),
        };
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO ministries (id, branch_id, name, description, created_at) \
            VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&ministry.id)
        .bind(&ministry.branch_id)
        .bind(&ministry.name)
        .bind(&ministry.description)
        .bind(&ministry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| friendly(e, &format!("Ministry '{name}'")))?;
        audit::record(&mut tx, actor, "create", "ministry", &ministry.id, &ministry.name).await?;
        tx.commit().await?;
        Ok(ministry)
    }

    pub(crate) async fn list_ministries(&self, branch_id: Option<&str>) -> Res<Vec<Ministry>> {
        let rows = sqlx::query(
            "SELECT id, branch_id, name, description, created_at FROM ministries \
            WHERE (?1 IS NULL OR branch_id = ?1) ORDER BY branch_id, name",
        )
        .bind(branch_id)
        .fetch_all(self.pool())
        .await
        .context("Unable to list ministries")?;
        rows.iter().map(ministry_from_row).collect()
    }

    /// Finds a ministry by id, or by name within `branch_id`.
    pub(crate) async fn find_ministry(
        &self,
        branch_id: &str,
        key: &str,
    ) -> Res<Option<Ministry>> {
        let row = sqlx::query(
            "SELECT id, branch_id, name, description, created_at FROM ministries \
            WHERE id = ?1 OR (branch_id = ?2 AND name = ?1 COLLATE NOCASE)",
        )
        .bind(key.trim())
        .bind(branch_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(ministry_from_row).transpose()
    }

    pub(crate) async fn remove_ministry(&self, actor: &str, id: &str) -> Res<()> {
        let mut tx = self.pool().begin().await?;
        let deleted = sqlx::query("DELETE FROM ministries WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            bail!("Ministry '{id}' not found");
        }
        audit::record(&mut tx, actor, "delete", "ministry", id, "").await?;
        tx.commit().await?;
        Ok(())
    }
}

pub(super) async fn find_branch(conn: &mut SqliteConnection, key: &str) -> Res<Option<Branch>> {
    let row = sqlx::query(
        "SELECT id, name, location, created_at FROM branches \
        WHERE id = ?1 OR name = ?1 COLLATE NOCASE",
    )
    .bind(key.trim())
    .fetch_optional(&mut *conn)
    .await
    .context("Unable to look up branch")?;
    row.as_ref().map(branch_from_row).transpose()
}

fn branch_from_row(row: &SqliteRow) -> Res<Branch> {
    Ok(Branch {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        created_at: row.try_get("created_at")?,
    })
}

fn ministry_from_row(row: &SqliteRow) -> Res<Ministry> {
    Ok(Ministry {
        id: row.try_get("id")?,
        branch_id: row.try_get("branch_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewAccount;
    use crate::model::{AccountKind, Amount};
    use tempfile::TempDir;

    const ADMIN: &str = "admin@example.org";

    #[tokio::test]
    async fn test_branch_lifecycle() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("ledger.sqlite")).await.unwrap();
        let main = db.add_branch(ADMIN, "Main", "Quezon City").await.unwrap();
        db.add_branch(ADMIN, "North", "Baguio").await.unwrap();
        assert!(db.add_branch(ADMIN, "main", "").await.is_err());

        let found = db.find_branch("MAIN").await.unwrap().unwrap();
        assert_eq!(found.id, main.id);
        let found = db.find_branch(&main.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Main");

        let updated = db
            .update_branch(ADMIN, "North", None, Some("La Trinidad"))
            .await
            .unwrap();
        assert_eq!(updated.name, "North");
        assert_eq!(updated.location, "La Trinidad");

        db.remove_branch(ADMIN, "North").await.unwrap();
        let names: Vec<String> = db
            .list_branches()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["Main".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_branch_with_accounts_fails() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("ledger.sqlite")).await.unwrap();
        let main = db.add_branch(ADMIN, "Main", "").await.unwrap();
        db.add_account(
            ADMIN,
            NewAccount {
                branch_id: main.id.clone(),
                ministry_id: None,
                name: "General Fund".into(),
                kind: AccountKind::Bank,
                account_number: String::new(),
                opening_balance: Amount::ZERO,
            },
        )
        .await
        .unwrap();
        let err = db.remove_branch(ADMIN, "Main").await.unwrap_err();
        assert!(err.to_string().contains("still owns 1 account"), "{err}");
        assert!(db.find_branch("Main").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ministries() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("ledger.sqlite")).await.unwrap();
        let main = db.add_branch(ADMIN, "Main", "").await.unwrap();
        let youth = db
            .add_ministry(ADMIN, &main.id, "Youth", "Youth fellowship")
            .await
            .unwrap();
        assert!(db.add_ministry(ADMIN, &main.id, "youth", "").await.is_err());
        assert_eq!(db.list_ministries(Some(&main.id)).await.unwrap().len(), 1);
        let found = db.find_ministry(&main.id, "YOUTH").await.unwrap().unwrap();
        assert_eq!(found.id, youth.id);
        db.remove_ministry(ADMIN, &youth.id).await.unwrap();
        assert!(db.list_ministries(None).await.unwrap().is_empty());
    }
}
