use serde::{Deserialize, Serialize};

use crate::budget::PreparedContext;
use crate::tools::ToolResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Token {
        content: String,
    },

    ToolStart {
        tool_use_id: String,
        tool_name: String,
        input: serde_json::Value,
    },

    ToolComplete {
        tool_use_id: String,
        result: ToolResult,
    },

    ToolError {
        tool_use_id: String,
        error: String,
    },

    /// Emitted each round after the history has been trimmed to the budget
    TokenBudgetUpdated {
        usage: TokenBudgetUsage,
    },

    Complete {
        usage: TokenUsage,
    },

    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(completion_tokens);
        self.total_tokens = self.prompt_tokens.saturating_add(self.completion_tokens);
    }
}

/// Token budget usage information sent to the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudgetUsage {
    /// Tokens used by the system prompt
    pub system_tokens: u32,
    /// Tokens used by the tool catalogue
    pub tool_tokens: u32,
    /// Tokens used by the selected history suffix
    pub window_tokens: u32,
    /// Total tokens in prepared context
    pub total_tokens: u32,
    /// Budget limit for input tokens
    pub budget_limit: u32,
    /// Whether truncation occurred
    pub truncation_occurred: bool,
    /// Number of history messages left out
    pub messages_removed: usize,
}

impl From<&PreparedContext> for TokenBudgetUsage {
    fn from(prepared: &PreparedContext) -> Self {
        Self {
            system_tokens: prepared.token_usage.system_tokens,
            tool_tokens: prepared.token_usage.tool_tokens,
            window_tokens: prepared.token_usage.window_tokens,
            total_tokens: prepared.token_usage.total_tokens,
            budget_limit: prepared.token_usage.budget_limit,
            truncation_occurred: prepared.truncation_occurred,
            messages_removed: prepared.messages_removed,
        }
    }
}
