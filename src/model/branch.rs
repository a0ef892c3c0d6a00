use serde::{Deserialize, Serialize};

/// An organizational location that owns users, accounts and transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub location: String,
    pub created_at: String,
}

/// A ministry (e.g. Youth, Music) within a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Ministry {
    pub id: String,
    pub branch_id: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
}
