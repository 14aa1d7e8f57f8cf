//! Core types for token budget management.

use serde::{Deserialize, Serialize};

use crate::agent::types::Message;
use crate::budget::limits::DEFAULT_MAX_OUTPUT_TOKENS;

/// Token budget configuration for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget {
    /// Maximum context window size for the model (input + output)
    pub max_context_tokens: u32,
    /// Maximum tokens reserved for the model's reply
    pub max_output_tokens: u32,
}

impl TokenBudget {
    pub fn new(max_context_tokens: u32, max_output_tokens: u32) -> Self {
        Self {
            max_context_tokens,
            max_output_tokens,
        }
    }

    /// Context window minus the reserved response allowance.
    pub fn max_usable_tokens(&self) -> u32 {
        self.max_context_tokens
            .saturating_sub(self.max_output_tokens)
    }

    /// Create a default budget for a model with the given context window.
    pub fn for_model(max_context_tokens: u32) -> Self {
        Self::new(
            max_context_tokens,
            DEFAULT_MAX_OUTPUT_TOKENS.min(max_context_tokens / 4),
        )
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        // Claude 3.5 Sonnet context window
        Self::for_model(200_000)
    }
}

/// Result of context preparation with budget enforcement.
#[derive(Debug, Clone)]
pub struct PreparedContext {
    /// Contiguous suffix of the history to send
    pub messages: Vec<Message>,
    /// Token usage breakdown
    pub token_usage: TokenUsageBreakdown,
    /// Whether older messages were left out
    pub truncation_occurred: bool,
    /// Number of history messages left out
    pub messages_removed: usize,
}

/// Detailed token usage breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsageBreakdown {
    /// Tokens used by the system prompt
    pub system_tokens: u32,
    /// Tokens used by the tool catalogue
    pub tool_tokens: u32,
    /// Tokens used by the selected messages
    pub window_tokens: u32,
    /// Total tokens in prepared context
    pub total_tokens: u32,
    /// Usable input tokens for the model
    pub budget_limit: u32,
}

impl TokenUsageBreakdown {
    /// Calculate percentage of budget used.
    pub fn usage_percentage(&self) -> f64 {
        if self.budget_limit == 0 {
            return 0.0;
        }
        (self.total_tokens as f64 / self.budget_limit as f64) * 100.0
    }
}
