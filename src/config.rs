//! Configuration file handling.
//!
//! The configuration file is stored at `$LEDGER_HOME/config.json` and contains settings for the
//! ledger such as the church name, currency, backup settings and the payment provider.

use crate::backup::Backup;
use crate::db::Db;
use crate::error::{ErrorType, IntoResult, Res};
use crate::Result;
use crate::utils;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "ledger";
const CONFIG_VERSION: u8 = 1;
const BACKUP_COPIES: u32 = 5;
const DEFAULT_CURRENCY: &str = "PHP";
const SECRETS: &str = ".secrets";
const BACKUPS: &str = ".backups";
const PAYMENTS_KEY: &str = "payments_key";
const CONFIG_JSON: &str = "config.json";
pub(crate) const LEDGER_SQLITE: &str = "ledger.sqlite";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$LEDGER_HOME` and from there it loads `$LEDGER_HOME/config.json`. It provides
/// paths to other items that are expected in a certain location within the home directory, and
/// holds the open database.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    backups: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the data directory, its subdirectories, an initial `config.json` and an empty
    /// SQLite database.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of data directory, e.g. `$HOME/ledger`
    /// - `church_name` - Printed on reports.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail or if a database already exists.
    pub async fn create(dir: impl Into<PathBuf>, church_name: &str) -> Res<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the ledger home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let backups_dir = root.join(BACKUPS);
        utils::make_dir(&backups_dir).await?;
        let secrets_dir = root.join(SECRETS);
        utils::make_dir(&secrets_dir).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!(
                "A ledger already exists at '{}', refusing to overwrite it",
                root.display()
            );
        }
        let config_file = ConfigFile {
            church_name: church_name.to_string(),
            ..Default::default()
        };
        config_file.save(&config_path).await?;

        let db_path = root.join(LEDGER_SQLITE);
        let db = Db::init(&db_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            backups: backups_dir,
            secrets: secrets_dir,
            config_path,
            config_file,
            db,
            sqlite_path: db_path,
        })
    }

    /// This will
    /// - validate that `ledger_home` exists and that the config file exists
    /// - load the config file
    /// - open the database, migrating it if needed
    /// - validate that the backups and secrets directories exist
    ///
    /// # Errors
    /// - `ErrorType::Config` for any of the above.
    pub async fn load(ledger_home: impl Into<PathBuf>) -> Result<Self> {
        Self::open(ledger_home.into())
            .await
            .pub_result(ErrorType::Config)
    }

    async fn open(ledger_home: PathBuf) -> Res<Self> {
        let root = utils::canonicalize(&ledger_home)
            .await
            .context("The ledger home directory is missing, run 'ledger init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let db_path = root.join(LEDGER_SQLITE);
        let db = Db::load(&db_path)
            .await
            .context("Unable to load SQLite DB")?;

        let config = Self {
            root: root.clone(),
            backups: root.join(BACKUPS),
            secrets: root.join(SECRETS),
            config_path,
            config_file,
            db,
            sqlite_path: db_path,
        };
        if !config.backups.is_dir() {
            bail!(
                "The backups directory is missing '{}'",
                config.backups.display()
            )
        }
        if !config.secrets.is_dir() {
            bail!(
                "The secrets directory is missing '{}'",
                config.secrets.display()
            )
        }
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn backups(&self) -> &Path {
        &self.backups
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn church_name(&self) -> &str {
        &self.config_file.church_name
    }

    pub fn currency(&self) -> &str {
        &self.config_file.currency
    }

    pub fn backup_copies(&self) -> u32 {
        self.config_file.backup_copies
    }

    /// Creates a new `Backup` instance for managing backup files.
    pub fn backup(&self) -> Backup {
        Backup::new(self)
    }

    /// The payment provider settings, if the provider has been configured.
    pub fn payments(&self) -> Option<&PaymentsConfig> {
        self.config_file.payments.as_ref()
    }

    /// Returns the path of the payment provider secret key. A relative `secret_key_path` is
    /// resolved against the home directory.
    pub fn payments_key_path(&self) -> PathBuf {
        match self
            .payments()
            .and_then(|p| p.secret_key_path.as_ref())
        {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => self.root.join(p),
            None => self.secrets.join(PAYMENTS_KEY),
        }
    }
}

/// Settings for the payment provider REST API.
///
/// The secret key is not stored here. It lives in its own file under `.secrets`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PaymentsConfig {
    /// e.g. `https://api.paymongo.com`
    pub base_url: String,

    /// Path to a file holding the secret key, relative to the home directory or absolute.
    /// Defaults to `.secrets/payments_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_path: Option<PathBuf>,

    /// Where the provider sends a donor after a successful checkout.
    #[serde(default = "default_success_url")]
    pub success_url: String,

    /// Where the provider sends a donor after a failed or cancelled checkout.
    #[serde(default = "default_failed_url")]
    pub failed_url: String,
}

fn default_success_url() -> String {
    "https://localhost/giving/success".to_string()
}

fn default_failed_url() -> String {
    "https://localhost/giving/failed".to_string()
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "ledger",
///   "config_version": 1,
///   "church_name": "Grace Fellowship",
///   "currency": "PHP",
///   "backup_copies": 5,
///   "payments": {
///     "base_url": "https://api.paymongo.com",
///     "success_url": "https://example.org/giving/success",
///     "failed_url": "https://example.org/giving/failed"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "ledger"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    #[serde(default)]
    church_name: String,

    /// ISO currency code printed in front of amounts
    #[serde(default = "default_currency")]
    currency: String,

    /// Number of backup copies to keep
    #[serde(default = "default_backup_copies")]
    backup_copies: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    payments: Option<PaymentsConfig>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_backup_copies() -> u32 {
    BACKUP_COPIES
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            church_name: String::new(),
            currency: default_currency(),
            backup_copies: BACKUP_COPIES,
            payments: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or names another application.
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let content = utils::read(path).await?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        anyhow::ensure!(
            config.config_version <= CONFIG_VERSION,
            "Config file version {} is newer than this program supports ({})",
            config.config_version,
            CONFIG_VERSION
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("ledger_home");

        let config = Config::create(&home_dir, "Grace Fellowship").await.unwrap();

        assert_eq!(config.church_name(), "Grace Fellowship");
        assert_eq!(config.currency(), "PHP");
        assert_eq!(config.backup_copies(), 5);
        assert!(config.backups().is_dir());
        assert!(config.secrets().is_dir());
        assert!(config.sqlite_path().is_file());
        assert!(config.config_path().is_file());
        assert!(config.payments().is_none());
    }

    #[tokio::test]
    async fn test_config_create_then_load() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().to_owned();
        Config::create(&home_dir, "Grace").await.unwrap();
        let loaded = Config::load(&home_dir).await.unwrap();
        assert_eq!(loaded.church_name(), "Grace");
        assert_eq!(
            loaded.payments_key_path(),
            loaded.secrets().join(PAYMENTS_KEY)
        );
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let dir = TempDir::new().unwrap();
        Config::create(dir.path(), "Grace").await.unwrap();
        assert!(Config::create(dir.path(), "Grace").await.is_err());
    }

    #[tokio::test]
    async fn test_load_missing_home() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(dir.path().join("nope")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{ "app_name": "ledger", "config_version": 1 }"#;
        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();
        assert_eq!(config.currency, "PHP");
        assert_eq!(config.backup_copies, 5);
        assert!(config.payments.is_none());
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{ "app_name": "cashbook", "config_version": 1 }"#;
        utils::write(&config_path, json).await.unwrap();

        let result = ConfigFile::load(&config_path).await;
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[tokio::test]
    async fn test_config_file_save_and_load_with_payments() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        let original = ConfigFile {
            church_name: "Grace".into(),
            currency: "USD".into(),
            payments: Some(PaymentsConfig {
                base_url: "https://payments.example.org".into(),
                secret_key_path: Some(PathBuf::from("keys/pay.txt")),
                success_url: default_success_url(),
                failed_url: default_failed_url(),
            }),
            ..Default::default()
        };
        original.save(&path).await.unwrap();
        let read = ConfigFile::load(&path).await.unwrap();
        assert_eq!(original, read);
    }

    #[test]
    fn test_config_file_serialization_omits_payments_when_none() {
        let json = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(!json.contains("payments"));
    }
}
