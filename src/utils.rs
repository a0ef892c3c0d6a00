use crate::error::Res;
use anyhow::Context;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Write a file.
pub(crate) async fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Res<()> {
    let path = path.as_ref();
    tokio::fs::write(path, contents)
        .await
        .context(format!("Unable to write to {}", path.to_string_lossy()))
}

/// Read a file to a `String`.
pub(crate) async fn read(path: &Path) -> Res<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read file at {}", path.display()))
}

/// Create a directory and any missing parents.
pub(crate) async fn make_dir(path: &Path) -> Res<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Unable to create directory at {}", path.display()))
}

pub(crate) async fn canonicalize(path: &Path) -> Res<PathBuf> {
    tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("Unable to canonicalize the path {}", path.display()))
}

pub(crate) async fn read_dir(path: &Path) -> Res<tokio::fs::ReadDir> {
    tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("Unable to read directory {}", path.display()))
}

pub(crate) async fn copy(from: &Path, to: &Path) -> Res<()> {
    tokio::fs::copy(from, to).await.with_context(|| {
        format!(
            "Unable to copy file from '{}' to '{}'",
            from.display(),
            to.display()
        )
    })?;
    Ok(())
}

pub(crate) async fn remove(path: &Path) -> Res<()> {
    tokio::fs::remove_file(path)
        .await
        .with_context(|| format!("Unable to remove file {}", path.display()))
}

/// Generates a unique record id such as `txn-3f2a...`. The prefix tells the reader what kind of
/// record the id belongs to.
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// The current time as an RFC 3339 string in UTC.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Returns "s" when `count` is not one.
pub(crate) fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[test]
fn test_new_id_has_prefix_and_is_unique() {
    let a = new_id("txn");
    let b = new_id("txn");
    assert!(a.starts_with("txn-"));
    assert_eq!(a.len(), "txn-".len() + 32);
    assert_ne!(a, b);
}
