//! Schema migrations for `ledger.sqlite`.
//!
//! `migration_NN_up.sql` takes the schema from version `NN-1` to `NN` and
//! `migration_NN_down.sql` takes it back. Each step runs in its own transaction together with the
//! `schema_version` update, so an interrupted migration leaves the database at the last finished
//! step.

use crate::error::Res;
use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::{debug, info};

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: include_str!("migration_01_up.sql"),
    down: include_str!("migration_01_down.sql"),
}];

/// One SQL script to run and the version the schema is at afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    sql: &'static str,
    version_after: i32,
}

/// Brings the schema from version `from` to version `to`, upgrading or downgrading as needed.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Res<()> {
    let steps = plan(from, to)?;
    if steps.is_empty() {
        debug!("Schema is at version {to}, nothing to migrate");
        return Ok(());
    }
    for step in steps {
        debug!("Migrating schema to version {}", step.version_after);
        apply(pool, step).await?;
    }
    info!("Migrated ledger schema from version {from} to {to}");
    Ok(())
}

/// Lists the steps from `from` to `to`. Fails before anything runs if a script is missing.
fn plan(from: i32, to: i32) -> Res<Vec<Step>> {
    let find = |version: i32| {
        MIGRATIONS
            .iter()
            .find(|m| m.version == version)
            .with_context(|| {
                format!("No migration for schema version {version} (migrating {from} -> {to})")
            })
    };
    if from < 0 || to < 0 {
        bail!("Schema versions cannot be negative ({from} -> {to})");
    }
    let mut steps = Vec::new();
    if from < to {
        for version in from + 1..=to {
            steps.push(Step {
                sql: find(version)?.up,
                version_after: version,
            });
        }
    } else {
        for version in (to + 1..=from).rev() {
            steps.push(Step {
                sql: find(version)?.down,
                version_after: version - 1,
            });
        }
    }
    Ok(steps)
}

async fn apply(pool: &SqlitePool, step: Step) -> Res<()> {
    let mut tx = pool.begin().await.context("Unable to start a migration")?;
    tx.execute(step.sql)
        .await
        .with_context(|| format!("Migration to version {} failed", step.version_after))?;
    sqlx::query("UPDATE schema_version SET version = ?")
        .bind(step.version_after)
        .execute(&mut *tx)
        .await
        .context("Unable to record the schema version")?;
    tx.commit().await.context("Unable to commit a migration")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    const TABLES: [&str; 8] = [
        "branches",
        "ministries",
        "users",
        "accounts",
        "transfers",
        "transfer_legs",
        "transactions",
        "audit_log",
    ];

    async fn empty_db() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("migrate.sqlite"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        pool.execute("CREATE TABLE schema_version (version INTEGER NOT NULL); INSERT INTO schema_version (version) VALUES (0);")
            .await
            .unwrap();
        (dir, pool)
    }

    async fn version(pool: &SqlitePool) -> i32 {
        sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn tables(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 1).await.unwrap();
        assert_eq!(version(&pool).await, 1);
        let created = tables(&pool).await;
        for table in TABLES {
            assert!(created.iter().any(|t| t == table), "{table} missing");
        }

        run(&pool, 1, 1).await.unwrap();
        assert_eq!(version(&pool).await, 1);

        run(&pool, 1, 0).await.unwrap();
        assert_eq!(version(&pool).await, 0);
        assert_eq!(tables(&pool).await, vec!["schema_version".to_string()]);
    }

    #[test]
    fn test_plan() {
        assert!(plan(1, 1).unwrap().is_empty());
        let up = plan(0, 1).unwrap();
        assert_eq!(up.len(), 1);
        assert_eq!(up[0].version_after, 1);
        let down = plan(1, 0).unwrap();
        assert_eq!(down[0].version_after, 0);
        assert_eq!(down[0].sql, MIGRATIONS[0].down);

        let err = plan(0, 2).unwrap_err();
        assert!(err.to_string().contains("version 2"), "{err}");
        assert!(plan(-1, 1).is_err());
    }
}
