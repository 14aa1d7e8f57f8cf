use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{McpCallResult, McpTool};

/// A live connection to one MCP server.
///
/// The transport behind it (stdio, SSE, HTTP) is owned by whoever opens the
/// connection; the chat side only lists and calls tools.
#[async_trait]
pub trait McpSession: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpTool>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpCallResult>;
}
