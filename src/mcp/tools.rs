use super::mcp_utils::tool_result;
use super::LedgerServer;
use crate::args::{
    FilterArgs, OutputFormat, RecordDonationArgs, RecordExpenseArgs, RequestTransferArgs,
};
use crate::commands;
use crate::model::TransferStatus;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content};
use rmcp::ErrorData as McpError;
use rmcp::{tool, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Parameters for listing transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListTransactionsParams {
    #[serde(flatten)]
    pub filter: FilterArgs,

    /// Return the records as JSON text instead of a table.
    #[serde(default)]
    pub json: bool,
}

/// Parameters for listing transfers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListTransfersParams {
    /// Only transfers in this state: pending, approved, rejected or completed.
    #[serde(default)]
    pub status: Option<TransferStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// Parameters for reviewing a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReviewTransferParams {
    /// The transfer id, e.g. `trf-...`.
    pub id: String,

    pub decision: Decision,

    /// Why the transfer was approved or rejected. Stored with the review.
    #[serde(default)]
    pub note: Option<String>,
}

#[tool_router(vis = "pub(super)")]
impl LedgerServer {
    /// Initialize the ledger service.
    ///
    /// Returns the usage notes for the other tools. Call this first; the other tools refuse to
    /// run until it has been called.
    #[tool]
    async fn initialize_service(&self) -> Result<CallToolResult, McpError> {
        let mut initialized = self.initialized.lock().await;
        *initialized = true;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{}\nYou are acting as {}.",
            include_str!("docs/INSTRUCTIONS.md"),
            self.actor
        ))]))
    }

    /// Summarize income and expenses.
    ///
    /// Totals completed transactions matching the filter: income split into tithes, offerings,
    /// donations and other income, then expenses and the net. Also returns per-category and
    /// per-branch totals as JSON.
    #[tool]
    async fn finance_summary(
        &self,
        Parameters(filter): Parameters<FilterArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: finance_summary called");
        tool_result(commands::summarize(self.config(), &self.actor, &filter).await)
    }

    /// List transactions.
    ///
    /// Returns completed transactions matching the filter, newest first, as a table (or JSON text
    /// when `json` is true) followed by the records as JSON.
    #[tool]
    async fn list_transactions(
        &self,
        Parameters(params): Parameters<ListTransactionsParams>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: list_transactions called");
        let format = if params.json {
            OutputFormat::Json
        } else {
            OutputFormat::Table
        };
        tool_result(
            commands::list_transactions(self.config(), &self.actor, &params.filter, format).await,
        )
    }

    /// Record a tithe, offering or donation.
    ///
    /// Give an `account` (id or name) to credit its balance, or only a `branch` for a record that
    /// is not tied to an account. Dates are YYYY-MM-DD and default to today.
    #[tool]
    async fn record_donation(
        &self,
        Parameters(args): Parameters<RecordDonationArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: record_donation called");
        tool_result(commands::record_donation(self.config(), &self.actor, args).await)
    }

    /// Record an expense.
    ///
    /// Give an `account` (id or name) to debit its balance, or only a `branch`. The balance may go
    /// below zero.
    #[tool]
    async fn record_expense(
        &self,
        Parameters(args): Parameters<RecordExpenseArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: record_expense called");
        tool_result(commands::record_expense(self.config(), &self.actor, args).await)
    }

    /// List transfer requests, newest first.
    #[tool]
    async fn list_transfers(
        &self,
        Parameters(params): Parameters<ListTransfersParams>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: list_transfers called");
        tool_result(commands::list_transfers(self.config(), &self.actor, params.status).await)
    }

    /// Request a transfer.
    ///
    /// Moves money from one account to one or more destination accounts once approved. The
    /// request is stored as pending; nothing moves until `review_transfer` approves it.
    #[tool]
    async fn request_transfer(
        &self,
        Parameters(args): Parameters<RequestTransferArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: request_transfer called");
        tool_result(commands::request_transfer(self.config(), &self.actor, args).await)
    }

    /// Approve or reject a pending transfer.
    ///
    /// Approval takes a backup and then completes the transfer: every destination is credited and
    /// the source debited in one database transaction. If a payout fails the transfer stays
    /// approved and can be resumed from the command line.
    #[tool]
    async fn review_transfer(
        &self,
        Parameters(params): Parameters<ReviewTransferParams>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: review_transfer called");
        let note = params.note.as_deref();
        let result = match params.decision {
            Decision::Approve => {
                commands::approve_transfer(self.config(), self.mode, &self.actor, &params.id, note)
                    .await
            }
            Decision::Reject => {
                commands::reject_transfer(self.config(), &self.actor, &params.id, note).await
            }
        };
        tool_result(result)
    }
}
