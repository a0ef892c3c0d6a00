//! This module is responsible for reading, writing and managing the SQLite database.
//!
//! Every mutation runs inside a SQLite transaction that also writes its audit log entry, so a
//! change and its audit record are committed or rolled back together.

mod accounts;
mod audit;
mod branches;
mod migrations;
mod transactions;
mod transfers;
mod users;

pub(crate) use accounts::NewAccount;
pub(crate) use audit::{AuditQuery, DEFAULT_AUDIT_LIMIT};
pub(crate) use transfers::{NewTransfer, Review};

use crate::error::Res;
use crate::model::Amount;
use anyhow::{anyhow, bail, Context};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// The schema version this build of the program expects.
const CURRENT_VERSION: i32 = 1;

#[derive(Debug, Clone)]
pub(crate) struct Db {
    pool: SqlitePool,
}

impl Db {
    /// - Validates that no file currently exists at `path`
    /// - Creates a new SQLite file at `path`
    /// - Initializes the database schema
    /// - Returns a constructed `Db` object for further operations
    pub(crate) async fn init(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database already exists at '{}'", path.display());
        }
        let pool = connect(path, true).await?;

        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Failed to create schema_version table")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .context("Failed to insert initial schema version")?;

        migrations::run(&pool, 0, CURRENT_VERSION).await?;
        debug!("Created database at {}", path.display());
        Ok(Self { pool })
    }

    /// - Validates that there is a SQLite file at `path`
    /// - Creates a SQLite client
    /// - Updates the database schema with migrations if it is out-of-date
    /// - Returns a constructed `Db` object for further operations
    pub(crate) async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        let db = Self { pool };

        let version = db.schema_version().await?;
        if version > CURRENT_VERSION {
            bail!(
                "The database schema version {version} is newer than this program supports \
                ({CURRENT_VERSION}). Is a newer version of ledger available?"
            );
        }
        migrations::run(&db.pool, version, CURRENT_VERSION).await?;
        Ok(db)
    }

    pub(crate) async fn schema_version(&self) -> Res<i32> {
        let row: (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to query schema version")?;
        Ok(row.0)
    }

    /// Writes a consistent copy of the database to `destination`.
    pub(crate) async fn copy_to(&self, destination: &Path) -> Res<()> {
        let target = destination.to_string_lossy().replace('\'', "''");
        sqlx::query(&format!("VACUUM INTO '{target}'"))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Unable to copy the database to {}", destination.display()))?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn connect(path: &Path, create: bool) -> Res<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open SQLite database at {}", path.display()))
}

/// Reads a decimal TEXT column.
fn amount_col(row: &SqliteRow, col: &str) -> Res<Amount> {
    let s: String = row.try_get(col)?;
    Amount::from_str(&s).with_context(|| format!("Invalid amount '{s}' in column {col}"))
}

/// Reads a `YYYY-MM-DD` TEXT column.
fn date_col(row: &SqliteRow, col: &str) -> Res<NaiveDate> {
    let s: String = row.try_get(col)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{s}' in column {col}"))
}

/// Reads a TEXT column holding an enum.
fn enum_col<T>(row: &SqliteRow, col: &str) -> Res<T>
where
    T: FromStr,
    T::Err: Display,
{
    let s: String = row.try_get(col)?;
    T::from_str(&s).map_err(|e| anyhow!("Invalid value '{s}' in column {col}: {e}"))
}

/// Stored form of an amount, always with two decimal places.
fn amount_text(amount: Amount) -> String {
    format!("{:.2}", amount.value())
}

/// Turns SQLite constraint failures into a readable message naming `what`.
fn friendly(e: sqlx::Error, what: &str) -> anyhow::Error {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        anyhow!("{what} already exists")
    } else if msg.contains("FOREIGN KEY constraint failed") {
        anyhow!("{what} refers to a missing record or is still in use")
    } else {
        anyhow::Error::new(e).context(format!("Database error while saving {what}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite");
        let db = Db::init(&path).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), CURRENT_VERSION);
        drop(db);

        let db = Db::load(&path).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_init_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite");
        std::fs::write(&path, b"").unwrap();
        assert!(Db::init(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Db::load(dir.path().join("missing.sqlite")).await.is_err());
    }

    #[tokio::test]
    async fn test_copy_to() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("ledger.sqlite")).await.unwrap();
        let copy = dir.path().join("copy.sqlite");
        db.copy_to(&copy).await.unwrap();
        let loaded = Db::load(&copy).await.unwrap();
        assert_eq!(loaded.schema_version().await.unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_amount_text() {
        let a = Amount::from_str("1250.5").unwrap();
        assert_eq!(amount_text(a), "1250.50");
        assert_eq!(amount_text(Amount::ZERO), "0.00");
    }
}
