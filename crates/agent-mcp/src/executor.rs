use agent_core::tools::{ToolDescriptor, ToolError, ToolExecutor, ToolResult, ToolUse};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::catalogue::ToolCatalogue;

/// Tool executor that routes each call to the MCP connection owning the tool.
///
/// Lookup and call failures come back as error results for the model rather
/// than as errors, so a broken server never ends the turn.
pub struct McpToolExecutor {
    catalogue: Arc<ToolCatalogue>,
}

impl McpToolExecutor {
    pub fn new(catalogue: Arc<ToolCatalogue>) -> Self {
        Self { catalogue }
    }

    pub fn catalogue(&self) -> &Arc<ToolCatalogue> {
        &self.catalogue
    }
}

#[async_trait]
impl ToolExecutor for McpToolExecutor {
    async fn execute(&self, call: &ToolUse) -> std::result::Result<ToolResult, ToolError> {
        let tool_name = &call.name;

        let snapshot = self.catalogue.snapshot();
        let Some(connection) = snapshot.owner_of(tool_name) else {
            warn!("Tool {} not found in any MCP connection", tool_name);
            return Ok(ToolResult::error(format!(
                "Tool {} not found in any MCP connection",
                tool_name
            )));
        };

        let Some(session) = self.catalogue.session(connection) else {
            warn!("MCP {} not found for tool {}", connection, tool_name);
            return Ok(ToolResult::error(format!(
                "MCP {} not found in any MCP connection",
                connection
            )));
        };

        debug!("Executing MCP tool: {} (connection: {})", tool_name, connection);

        let arguments = if call.input.is_null() {
            serde_json::json!({})
        } else {
            call.input.clone()
        };

        match session.call_tool(tool_name, arguments).await {
            Ok(result) => {
                let content = result.to_text();
                if result.is_error {
                    Ok(ToolResult {
                        success: false,
                        result: content,
                    })
                } else {
                    Ok(ToolResult::ok(content))
                }
            }
            Err(e) => {
                error!("MCP tool execution failed: {}", e);
                Ok(ToolResult::error(format!(
                    "Error executing tool {}: {}",
                    tool_name, e
                )))
            }
        }
    }

    fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.catalogue.snapshot().tools().to_vec()
    }
}
