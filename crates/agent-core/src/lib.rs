pub mod agent;
pub mod budget;
pub mod tools;

pub use agent::events::{AgentEvent, TokenBudgetUsage, TokenUsage};
pub use agent::types::{ContentBlock, Message, MessageContent, Role, Session};
pub use agent::{AgentError, HistoryError};
pub use budget::{ContextBudgeter, SharedTokenCounter, TokenBudget, TokenCounter};
pub use tools::{
    execute_tool_call, ToolDescriptor, ToolError, ToolExecutor, ToolResult, ToolUse,
    ToolUseAccumulator, ToolUseDelta,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
