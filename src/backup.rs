//! Rotating copies of the SQLite database.

use crate::db::Db;
use crate::error::Res;
use crate::{utils, Config};
use anyhow::Context;
use chrono::Local;
use std::path::PathBuf;
use tracing::debug;

/// Prefix for SQLite backup files.
pub const SQLITE: &str = "ledger.sqlite";

/// Manages backup file creation and rotation.
///
/// Create a new instance via `Config::backup()` or `Backup::new()`.
#[derive(Debug, Clone)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
    db: Db,
}

impl Backup {
    pub fn new(config: &Config) -> Self {
        Self {
            backups_dir: config.backups().to_path_buf(),
            backup_copies: config.backup_copies(),
            db: config.db().clone(),
        }
    }

    /// Writes a copy of the database to the backups directory as `ledger.sqlite.YYYY-MM-DD-NNN`
    /// and then deletes the oldest copies beyond `backup_copies`.
    ///
    /// Returns the path to the created backup file.
    pub async fn copy_sqlite(&self) -> Res<PathBuf> {
        let date = today();
        let seq = self.next_sequence_number(SQLITE, &date).await?;
        let filename = format!("{SQLITE}.{date}-{seq:03}");
        let path = self.backups_dir.join(&filename);

        self.db.copy_to(&path).await?;
        debug!("Backed up the database to {}", path.display());

        self.rotate(SQLITE).await?;

        Ok(path)
    }

    /// Scans the backups directory for existing files with the given prefix and date, and
    /// returns the next sequence number.
    async fn next_sequence_number(&self, prefix: &str, date: &str) -> Res<u32> {
        let mut max_seq: u32 = 0;

        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(seq) = parse_sequence_number(&name, prefix, date) {
                max_seq = max_seq.max(seq);
            }
        }

        Ok(max_seq + 1)
    }

    /// Keeps only the newest `backup_copies` files with the given prefix.
    async fn rotate(&self, prefix: &str) -> Res<()> {
        let mut files: Vec<(PathBuf, String)> = Vec::new();

        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_backup_file(&name, prefix) {
                files.push((entry.path(), name));
            }
        }

        // The name format makes lexical order the same as date then sequence order.
        files.sort_by(|a, b| a.1.cmp(&b.1));

        let to_delete = files.len().saturating_sub(self.backup_copies as usize);
        for (path, _) in files.into_iter().take(to_delete) {
            utils::remove(&path).await?;
        }

        Ok(())
    }
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Parses NNN out of `{prefix}.{date}-NNN`. Returns None if the filename doesn't match.
fn parse_sequence_number(filename: &str, prefix: &str, date: &str) -> Option<u32> {
    let remainder = filename.strip_prefix(&format!("{prefix}.{date}-"))?;
    if remainder.is_empty() || !remainder.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    remainder.parse().ok()
}

/// True for `{prefix}.YYYY-MM-DD-NNN`. SQLite side files such as `-journal` do not match.
fn is_backup_file(filename: &str, prefix: &str) -> bool {
    let Some(rest) = filename.strip_prefix(&format!("{prefix}.")) else {
        return false;
    };
    match rest.rsplit_once('-') {
        Some((date, seq)) => {
            date.len() == 10 && !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[test]
    fn test_parse_sequence_number() {
        assert_eq!(
            parse_sequence_number("ledger.sqlite.2025-12-14-001", "ledger.sqlite", "2025-12-14"),
            Some(1)
        );
        assert_eq!(
            parse_sequence_number("ledger.sqlite.2025-12-14-042", "ledger.sqlite", "2025-12-14"),
            Some(42)
        );
        // Wrong date
        assert_eq!(
            parse_sequence_number("ledger.sqlite.2025-12-13-001", "ledger.sqlite", "2025-12-14"),
            None
        );
        // Side file
        assert_eq!(
            parse_sequence_number(
                "ledger.sqlite.2025-12-14-001-journal",
                "ledger.sqlite",
                "2025-12-14"
            ),
            None
        );
    }

    #[test]
    fn test_is_backup_file() {
        assert!(is_backup_file("ledger.sqlite.2025-12-14-001", "ledger.sqlite"));
        assert!(!is_backup_file("ledger.sqlite", "ledger.sqlite"));
        assert!(!is_backup_file(
            "ledger.sqlite.2025-12-14-001-wal",
            "ledger.sqlite"
        ));
        assert!(!is_backup_file("other.2025-12-14-001", "ledger.sqlite"));
    }

    #[tokio::test]
    async fn test_copy_sqlite_rotates() {
        let env = TestEnv::new().await;
        let backup = env.config().backup();
        let mut paths = Vec::new();
        for _ in 0..7 {
            paths.push(backup.copy_sqlite().await.unwrap());
        }
        assert!(paths.iter().all(|p| p
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("ledger.sqlite.")));

        let mut kept = Vec::new();
        for entry in std::fs::read_dir(env.config().backups()).unwrap() {
            kept.push(entry.unwrap().file_name().to_string_lossy().to_string());
        }
        kept.sort();
        assert_eq!(kept.len(), 5);
        assert!(kept[4].ends_with("-007"));
        assert!(kept[0].ends_with("-003"));
    }
}
