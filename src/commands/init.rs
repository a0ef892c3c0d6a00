use crate::args::InitArgs;
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::model::{Role, User};
use crate::{Config, Error, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories, `config.json`, an empty database, and the first
/// administrator.
///
/// # Arguments
/// - `ledger_home` - The directory that will be the root of data directory, e.g. `$HOME/ledger`
/// - `args` - The church name and the administrator's email and name.
///
/// # Errors
/// - Returns an error if the administrator email is not an email address.
/// - Returns an error if a ledger already exists at `ledger_home` or any file operation fails.
pub async fn init(ledger_home: &Path, args: &InitArgs) -> Result<Out<User>> {
    let email = args.admin_email().trim();
    if !email.contains('@') {
        return Err(Error::msg(
            ErrorType::Validation,
            format!("'{email}' is not an email address"),
        ));
    }
    let config = Config::create(ledger_home, args.church_name())
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;
    let admin = config
        .db()
        .add_user(email, email, args.admin_name(), Role::Admin, None)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Created the ledger for {} at {}. Run commands as {} with --actor or LEDGER_ACTOR",
            config.church_name(),
            config.root().display(),
            admin.email
        ),
        admin,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_admin() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("ledger");
        let args = InitArgs::new("Grace Fellowship", "ana@example.org", "Ana");
        let out = init(&home, &args).await.unwrap();
        let admin = out.structure().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(home.join("config.json").is_file());
        assert!(home.join("ledger.sqlite").is_file());

        let config = Config::load(&home).await.unwrap();
        assert_eq!(config.church_name(), "Grace Fellowship");
        let users = config.db().list_users().await.unwrap();
        assert_eq!(users.len(), 1);

        // A second init must not clobber the first.
        let err = init(&home, &args).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);
    }

    #[tokio::test]
    async fn test_init_rejects_bad_email() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("ledger");
        let err = init(&home, &InitArgs::new("Grace", "ana", "Ana"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(!home.exists());
    }
}
