use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// The system prompt and tool catalogue leave no room for any history
    #[error("Context budget exhausted: {0}")]
    BudgetExhausted(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Rejected attempts to append to a session history.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    #[error("tool blocks must be appended as a tool exchange")]
    ToolBlocksOutsideExchange,

    #[error("tool result '{tool_use_id}' has no matching tool use")]
    UnpairedToolResult { tool_use_id: String },

    #[error("tool use '{tool_use_id}' has no matching tool result")]
    MissingToolResult { tool_use_id: String },

    #[error("malformed tool exchange: {0}")]
    MalformedExchange(String),
}
