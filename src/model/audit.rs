use serde::{Deserialize, Serialize};

/// One row of the audit log. Every successful mutation writes exactly one entry, in the same
/// database transaction as the change itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    /// Email of the acting user.
    pub actor: String,
    /// Dotted verb such as `transfer.approve`.
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub details: String,
}
