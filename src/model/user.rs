use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The dashboard a user works in. Each role carries a fixed set of `Permission`s.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Bishop,
    Finance,
}

serde_plain::derive_display_from_serialize!(Role);
serde_plain::derive_fromstr_from_deserialize!(Role);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

serde_plain::derive_display_from_serialize!(UserStatus);
serde_plain::derive_fromstr_from_deserialize!(UserStatus);

/// Actions that are gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewFinances,
    RecordTransactions,
    ManageAccounts,
    RequestTransfers,
    ReviewTransfers,
    ExportReports,
    ManageBranches,
    ManageUsers,
    ViewAudit,
}

serde_plain::derive_display_from_serialize!(Permission);

impl Role {
    pub fn permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Admin => &[
                ViewFinances,
                RecordTransactions,
                ManageAccounts,
                RequestTransfers,
                ReviewTransfers,
                ExportReports,
                ManageBranches,
                ManageUsers,
                ViewAudit,
            ],
            Role::Bishop => &[
                ViewFinances,
                ReviewTransfers,
                ExportReports,
                ManageBranches,
                ViewAudit,
            ],
            Role::Finance => &[
                ViewFinances,
                RecordTransactions,
                ManageAccounts,
                RequestTransfers,
                ExportReports,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    pub status: UserStatus,
    pub created_at: String,
}

impl User {
    /// Inactive users can do nothing.
    pub fn can(&self, permission: Permission) -> bool {
        self.status == UserStatus::Active && self.role.permissions().contains(&permission)
    }
}
