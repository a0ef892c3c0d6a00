//! MCP server command handler.
//!
//! This module implements the `ledger mcp` command which runs an MCP server
//! for AI agent integration.

use crate::commands::{authorize, Out};
use crate::mcp::Io;
use crate::model::Permission;
use crate::{mcp, Config, Mode, Result};

/// Runs the MCP server. Every tool call acts as `actor`, who must be an active user.
///
/// This launches a long-running process that communicates via JSON-RPC over stdin/stdout.
/// MCP clients launch this as a subprocess.
pub async fn mcp(config: Config, mode: Mode, actor: &str) -> Result<Out<()>> {
    let user = authorize(&config, actor, Permission::ViewFinances).await?;
    mcp::run_server(config, mode, user.email, Io::Stdio).await?;
    Ok("Done running MCP server".into())
}
