//! Command handlers for the ledger CLI.
//!
//! Every handler except `init` takes the acting user's email and checks their role before doing
//! anything. The same handlers back the MCP tools.

mod accounts;
mod audit;
mod backup;
mod branches;
mod init;
mod mcp;
mod payments;
mod report;
mod transactions;
mod transfers;
mod users;

use crate::error::{ErrorType, IntoResult};
use crate::model::{Permission, User, UserStatus};
use crate::{Config, Error, Result};
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use accounts::{add_account, list_accounts, recompute_balances};
pub use audit::list_audit;
pub use backup::backup;
pub use branches::{
    add_branch, add_ministry, list_branches, list_ministries, remove_branch, remove_ministry,
    update_branch,
};
pub use init::init;
pub use mcp::mcp;
pub use payments::{checkout, confirm_payment, list_pending, Checkout};
pub use report::export_report;
pub use transactions::{
    import_transactions, list_transactions, record_donation, record_expense, summarize,
    void_transaction, SummaryReport,
};
pub use transfers::{
    approve_transfer, list_transfers, reject_transfer, request_transfer, resume_transfer,
};
pub use users::{add_user, list_users, remove_user, set_user_role, set_user_status};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data to both the command line and MCP server interfaces.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Looks up the acting user and checks that they hold `permission`.
///
/// # Errors
/// - `ErrorType::Permission` when the user is unknown, inactive, or their role lacks `permission`.
pub(crate) async fn authorize(config: &Config, actor: &str, permission: Permission) -> Result<User> {
    let user = config
        .db()
        .find_user(actor)
        .await
        .pub_result(ErrorType::Database)?
        .ok_or_else(|| Error::msg(ErrorType::Permission, format!("Unknown user '{actor}'")))?;
    if user.status != UserStatus::Active {
        return Err(Error::msg(
            ErrorType::Permission,
            format!("User '{}' is inactive", user.email),
        ));
    }
    if !user.can(permission) {
        return Err(Error::msg(
            ErrorType::Permission,
            format!(
                "User '{}' has the {} role, which does not grant {permission}",
                user.email, user.role
            ),
        ));
    }
    debug!("{} is allowed to {permission}", user.email);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_authorize() {
        let env = TestEnv::new().await;
        let config = env.config();

        let admin = authorize(&config, TestEnv::ADMIN, Permission::ManageUsers)
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);

        let err = authorize(&config, TestEnv::BISHOP, Permission::RecordTransactions)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Permission);

        let err = authorize(&config, "nobody@example.org", Permission::ViewFinances)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Permission);

        config
            .db()
            .set_user_status(TestEnv::ADMIN, TestEnv::FINANCE, UserStatus::Inactive)
            .await
            .unwrap();
        let err = authorize(&config, TestEnv::FINANCE, Permission::ViewFinances)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("inactive"));
    }
}
