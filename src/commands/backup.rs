use crate::commands::{authorize, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::Permission;
use crate::{Config, Result};
use std::path::PathBuf;

/// Copies the database into `.backups`, keeping the newest `backup_copies` files. Any active user
/// may take a backup.
pub async fn backup(config: Config, actor: &str) -> Result<Out<PathBuf>> {
    authorize(&config, actor, Permission::ViewFinances).await?;
    let path = config
        .backup()
        .copy_sqlite()
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(format!("Backed up to {}", path.display()), path))
}
