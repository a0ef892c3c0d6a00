//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::db::NewAccount;
use crate::model::{AccountKind, Amount, FinanceAccount, Role};
use crate::Config;
use std::str::FromStr;
use tempfile::TempDir;

/// Test environment that sets up a ledger home directory with Config and database, three users
/// (one per role), two branches and one account in each.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
    main_fund: FinanceAccount,
    north_fund: FinanceAccount,
}

impl TestEnv {
    pub const ADMIN: &'static str = "admin@example.org";
    pub const BISHOP: &'static str = "bishop@example.org";
    pub const FINANCE: &'static str = "finance@example.org";

    /// Opening balance of the `Main Fund` account.
    pub const MAIN_OPENING: &'static str = "10000";
    /// Opening balance of the `North Fund` account.
    pub const NORTH_OPENING: &'static str = "2000";

    /// Creates a test environment with Config, an initialized database and the seed data.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("ledger");
        let config = Config::create(&root, "Grace Fellowship").await.unwrap();
        let db = config.db();

        db.add_user(Self::ADMIN, Self::ADMIN, "Ana Admin", Role::Admin, None)
            .await
            .unwrap();
        db.add_user(Self::ADMIN, Self::BISHOP, "Ben Bishop", Role::Bishop, None)
            .await
            .unwrap();
        db.add_user(Self::ADMIN, Self::FINANCE, "Fe Finance", Role::Finance, None)
            .await
            .unwrap();

        let main = db.add_branch(Self::ADMIN, "Main", "Quezon City").await.unwrap();
        let north = db.add_branch(Self::ADMIN, "North", "Baguio").await.unwrap();

        let main_fund = db
            .add_account(
                Self::ADMIN,
                NewAccount {
                    branch_id: main.id,
                    ministry_id: None,
                    name: "Main Fund".into(),
                    kind: AccountKind::Bank,
                    account_number: "0011-2233".into(),
                    opening_balance: Amount::from_str(Self::MAIN_OPENING).unwrap(),
                },
            )
            .await
            .unwrap();
        let north_fund = db
            .add_account(
                Self::ADMIN,
                NewAccount {
                    branch_id: north.id,
                    ministry_id: None,
                    name: "North Fund".into(),
                    kind: AccountKind::EWallet,
                    account_number: "0917-555-0101".into(),
                    opening_balance: Amount::from_str(Self::NORTH_OPENING).unwrap(),
                },
            )
            .await
            .unwrap();

        Self {
            _temp_dir: temp_dir,
            config,
            main_fund,
            north_fund,
        }
    }

    /// Returns a clone of the Config.
    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// The `Main Fund` account as it was seeded.
    pub fn main_fund(&self) -> &FinanceAccount {
        &self.main_fund
    }

    /// The `North Fund` account as it was seeded.
    pub fn north_fund(&self) -> &FinanceAccount {
        &self.north_fund
    }

    /// The current stored balance of an account.
    pub async fn balance(&self, account_id: &str) -> Amount {
        self.config
            .db()
            .require_account(account_id)
            .await
            .unwrap()
            .balance
    }

    /// A path inside the temporary directory, outside of the ledger home.
    pub fn scratch(&self, name: &str) -> std::path::PathBuf {
        self._temp_dir.path().join(name)
    }
}

/// Parses an amount literal.
pub fn amt(s: &str) -> Amount {
    Amount::from_str(s).unwrap()
}
