use crate::db::{audit, enum_col, friendly, Db};
use crate::error::Res;
use crate::model::{Role, User, UserStatus};
use crate::utils;
use anyhow::{bail, Context};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

const SELECT_USERS: &str =
    "SELECT id, email, name, role, branch_id, status, created_at FROM users";

impl Db {
    pub(crate) async fn add_user(
        &self,
        actor: &str,
        email: &str,
        name: &str,
        role: Role,
        branch_id: Option<&str>,
    ) -> Res<User> {
        let email = email.trim();
        if !email.contains('@') {
            bail!("'{email}' is not an email address");
        }
        let user = User {
            id: utils::new_id("usr"),
            email: email.to_string(),
            name: name.trim().to_string(),
            role,
            branch_id: branch_id.map(String::from),
            status: UserStatus::Active,
            created_at: utils::now(),
        };

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "INSERT INTO users (id, email, name, role, branch_id, status, created_at) \
            VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.to_string())
        .bind(&user.branch_id)
        .bind(user.status.to_string())
        .bind(&user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| friendly(e, &format!("User {email}")))?;
        audit::record(
            &mut tx,
            actor,
            "create",
            "user",
            &user.id,
            format!("{} as {}", user.email, user.role),
        )
        .await?;
        tx.commit().await?;
        Ok(user)
    }

    pub(crate) async fn find_user(&self, email: &str) -> Res<Option<User>> {
        let row = sqlx::query(&format!("{SELECT_USERS} WHERE email = ? COLLATE NOCASE"))
            .bind(email.trim())
            .fetch_optional(self.pool())
            .await
            .context("Unable to look up user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub(crate) async fn list_users(&self) -> Res<Vec<User>> {
        let rows = sqlx::query(&format!("{SELECT_USERS} ORDER BY email"))
            .fetch_all(self.pool())
            .await
            .context("Unable to list users")?;
        rows.iter().map(user_from_row).collect()
    }

    pub(crate) async fn set_user_role(&self, actor: &str, email: &str, role: Role) -> Res<User> {
        let mut tx = self.pool().begin().await?;
        let updated = sqlx::query("UPDATE users SET role = ? WHERE email = ? COLLATE NOCASE")
            .bind(role.to_string())
            .bind(email)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            bail!("No user with email {email}");
        }
        audit::record(&mut tx, actor, "set_role", "user", email, role.to_string()).await?;
        tx.commit().await?;
        self.require_user(email).await
    }

    pub(crate) async fn set_user_status(
        &self,
        actor: &str,
        email: &str,
        status: UserStatus,
    ) -> Res<User> {
        let mut tx = self.pool().begin().await?;
        let updated = sqlx::query("UPDATE users SET status = ? WHERE email = ? COLLATE NOCASE")
            .bind(status.to_string())
            .bind(email)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            bail!("No user with email {email}");
        }
        audit::record(&mut tx, actor, "set_status", "user", email, status.to_string()).await?;
        tx.commit().await?;
        self.require_user(email).await
    }

    pub(crate) async fn remove_user(&self, actor: &str, email: &str) -> Res<()> {
        let mut tx = self.pool().begin().await?;
        let deleted = sqlx::query("DELETE FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            bail!("No user with email {email}");
        }
        audit::record(&mut tx, actor, "delete", "user", email, "").await?;
        tx.commit().await?;
        Ok(())
    }

    async fn require_user(&self, email: &str) -> Res<User> {
        self.find_user(email)
            .await?
            .with_context(|| format!("No user with email {email}"))
    }
}

fn user_from_row(row: &SqliteRow) -> Res<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: enum_col(row, "role")?,
        branch_id: row.try_get("branch_id")?,
        status: enum_col(row, "status")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::AuditQuery;
    use tempfile::TempDir;

    const ADMIN: &str = "admin@example.org";

    async fn db(dir: &TempDir) -> Db {
        Db::init(dir.path().join("ledger.sqlite")).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_find_and_list() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir).await;
        db.add_user(ADMIN, "Grace@Example.org", "Grace", Role::Finance, None)
            .await
            .unwrap();
        let found = db.find_user("grace@example.org").await.unwrap().unwrap();
        assert_eq!(found.role, Role::Finance);
        assert_eq!(found.status, UserStatus::Active);
        assert_eq!(db.list_users().await.unwrap().len(), 1);

        let audit = db.list_audit(&AuditQuery::default()).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].actor, ADMIN);
        assert_eq!(audit[0].entity, "user");
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir).await;
        db.add_user(ADMIN, "a@example.org", "A", Role::Bishop, None)
            .await
            .unwrap();
        let err = db
            .add_user(ADMIN, "A@example.org", "A2", Role::Finance, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");
    }

    #[tokio::test]
    async fn test_role_status_and_remove() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir).await;
        db.add_user(ADMIN, "b@example.org", "B", Role::Finance, None)
            .await
            .unwrap();
        let user = db
            .set_user_role(ADMIN, "b@example.org", Role::Bishop)
            .await
            .unwrap();
        assert_eq!(user.role, Role::Bishop);
        let user = db
            .set_user_status(ADMIN, "b@example.org", UserStatus::Inactive)
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Inactive);
        db.remove_user(ADMIN, "b@example.org").await.unwrap();
        assert!(db.find_user("b@example.org").await.unwrap().is_none());
        assert!(db.remove_user(ADMIN, "b@example.org").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_bad_email() {
        let dir = TempDir::new().unwrap();
        let db = db(&dir).await;
        assert!(db
            .add_user(ADMIN, "not-an-email", "X", Role::Admin, None)
            .await
            .is_err());
    }
}
