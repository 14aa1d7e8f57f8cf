pub mod accumulator;
pub mod executor;
pub mod types;

pub use accumulator::{ToolUseAccumulator, ToolUseDelta};
pub use executor::{execute_tool_call, ToolError, ToolExecutor};
pub use types::{ToolDescriptor, ToolResult, ToolUse};
