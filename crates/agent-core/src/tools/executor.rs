use async_trait::async_trait;
use thiserror::Error;

use crate::tools::{ToolDescriptor, ToolResult, ToolUse};

#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolUse) -> Result<ToolResult>;

    /// The tool catalogue as of this call.
    fn list_tools(&self) -> Vec<ToolDescriptor>;
}

/// Runs a tool call and folds any failure into an error result, so a broken
/// tool never aborts the conversation.
pub async fn execute_tool_call(call: &ToolUse, tools: &dyn ToolExecutor) -> ToolResult {
    match tools.execute(call).await {
        Ok(result) => result,
        Err(ToolError::NotFound(name)) => {
            tracing::warn!("Tool {} requested but not available", name);
            ToolResult::error(format!("Tool {} not found", name))
        }
        Err(error) => {
            tracing::warn!("Tool {} failed: {}", call.name, error);
            ToolResult::error(format!("Error executing tool {}: {}", call.name, error))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    struct StaticExecutor {
        results: HashMap<String, Result<ToolResult>>,
    }

    #[async_trait]
    impl ToolExecutor for StaticExecutor {
        async fn execute(&self, call: &ToolUse) -> Result<ToolResult> {
            self.results
                .get(&call.name)
                .cloned()
                .unwrap_or_else(|| Err(ToolError::NotFound(call.name.clone())))
        }

        fn list_tools(&self) -> Vec<ToolDescriptor> {
            Vec::new()
        }
    }

    fn make_tool_use(name: &str) -> ToolUse {
        ToolUse {
            id: "toolu_1".to_string(),
            name: name.to_string(),
            input: json!({}),
        }
    }

    #[tokio::test]
    async fn execute_tool_call_passes_through_success() {
        let mut results = HashMap::new();
        results.insert("echo".to_string(), Ok(ToolResult::ok("hi")));
        let tools = StaticExecutor { results };

        let result = execute_tool_call(&make_tool_use("echo"), &tools).await;

        assert_eq!(result, ToolResult::ok("hi"));
    }

    #[tokio::test]
    async fn execute_tool_call_turns_missing_tool_into_error_json() {
        let tools = StaticExecutor {
            results: HashMap::new(),
        };

        let result = execute_tool_call(&make_tool_use("nope"), &tools).await;

        assert!(!result.success);
        let payload: serde_json::Value = serde_json::from_str(&result.result).unwrap();
        assert_eq!(payload["error"], "Tool nope not found");
    }

    #[tokio::test]
    async fn execute_tool_call_turns_execution_failure_into_error_json() {
        let mut results = HashMap::new();
        results.insert(
            "flaky".to_string(),
            Err(ToolError::Execution("connection reset".to_string())),
        );
        let tools = StaticExecutor { results };

        let result = execute_tool_call(&make_tool_use("flaky"), &tools).await;

        assert!(!result.success);
        assert!(result.result.contains("Error executing tool flaky"));
        assert!(result.result.contains("connection reset"));
    }
}
