use crate::db::Db;
use crate::error::Res;
use crate::model::AuditEntry;
use crate::utils;
use anyhow::Context;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

pub(crate) const DEFAULT_AUDIT_LIMIT: i64 = 50;

/// Selects audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AuditQuery {
    pub(crate) actor: Option<String>,
    pub(crate) entity: Option<String>,
    pub(crate) limit: i64,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            actor: None,
            entity: None,
            limit: DEFAULT_AUDIT_LIMIT,
        }
    }
}

/// Appends an entry to the audit log. Always called on the same connection, and inside the same
/// SQLite transaction, as the change it describes.
pub(super) async fn record(
    conn: &mut SqliteConnection,
    actor: &str,
    action: &str,
    entity: &str,
    entity_id: &str,
    details: impl Into<String>,
) -> Res<()> {
    sqlx::query(
        "INSERT INTO audit_log (timestamp, actor, action, entity, entity_id, details) \
        VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(utils::now())
    .bind(actor)
    .bind(action)
    .bind(entity)
    .bind(entity_id)
    .bind(details.into())
    .execute(&mut *conn)
    .await
    .context("Unable to write the audit log")?;
    Ok(())
}

impl Db {
    pub(crate) async fn list_audit(&self, query: &AuditQuery) -> Res<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, actor, action, entity, entity_id, details FROM audit_log \
            WHERE (?1 IS NULL OR actor = ?1 COLLATE NOCASE) \
            AND (?2 IS NULL OR entity = ?2 COLLATE NOCASE) \
            ORDER BY id DESC LIMIT ?3",
        )
        .bind(query.actor.as_deref())
        .bind(query.entity.as_deref())
        .bind(query.limit.max(1))
        .fetch_all(self.pool())
        .await
        .context("Unable to read the audit log")?;
        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &SqliteRow) -> Res<AuditEntry> {
    Ok(AuditEntry {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        actor: row.try_get("actor")?,
        action: row.try_get("action")?,
        entity: row.try_get("entity")?,
        entity_id: row.try_get("entity_id")?,
        details: row.try_get("details")?,
    })
}
