//! Token counting for budget management.
//!
//! Provides BPE counting through tiktoken-rs and a heuristic fallback
//! (chars/4 + 10% margin) for model families without a known table.

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;

use crate::agent::types::{ContentBlock, Message, MessageContent};
use crate::budget::types::TokenBudget;
use crate::tools::ToolDescriptor;

/// Trait for token counting implementations, one per model family.
///
/// Counting is total: every input yields a count, and empty input yields 0.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in a plain text string.
    fn count_text(&self, text: &str) -> u32;

    /// Context window minus the reserved response allowance.
    fn max_usable_tokens(&self) -> u32;

    /// Count tokens in a single message.
    ///
    /// Plain string content counts its text. In block content only tool-result
    /// payloads count; text and tool-use blocks count 0 (tool uses are charged
    /// through the tool catalogue).
    fn count_message(&self, message: &Message) -> u32 {
        match &message.content {
            MessageContent::Text(text) => self.count_text(text),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { .. } => 0,
                    ContentBlock::ToolResult { content, .. } => {
                        self.count_text(&tool_result_text(content))
                    }
                    ContentBlock::ToolUse(_) => 0,
                })
                .fold(0u32, |acc, x| acc.saturating_add(x)),
        }
    }

    /// Count tokens in multiple messages.
    fn count_messages(&self, messages: &[Message]) -> u32 {
        messages
            .iter()
            .map(|m| self.count_message(m))
            .fold(0u32, |acc, x| acc.saturating_add(x))
    }

    /// Count tokens of a tool catalogue: name, description and serialized schema.
    fn count_tools(&self, tools: &[ToolDescriptor]) -> u32 {
        tools
            .iter()
            .map(|tool| {
                let schema = serde_json::to_string(&tool.input_schema).unwrap_or_default();
                self.count_text(&tool.name)
                    .saturating_add(self.count_text(&tool.description))
                    .saturating_add(self.count_text(&schema))
            })
            .fold(0u32, |acc, x| acc.saturating_add(x))
    }
}

/// Text form of a tool result payload as it is counted.
pub fn tool_result_text(content: &Value) -> Cow<'_, str> {
    match content {
        Value::String(text) => Cow::Borrowed(text.as_str()),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

/// Heuristic token counter using character-based estimation.
///
/// Uses the approximation: tokens ≈ characters / 4, with a 10% safety margin.
#[derive(Debug, Clone)]
pub struct HeuristicTokenCounter {
    budget: TokenBudget,
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
    /// Safety margin multiplier (default: 1.1 = 10% extra)
    safety_margin: f64,
}

impl HeuristicTokenCounter {
    /// Create a new heuristic counter with custom parameters.
    pub fn new(budget: TokenBudget, chars_per_token: f64, safety_margin: f64) -> Self {
        Self {
            budget,
            chars_per_token,
            safety_margin,
        }
    }

    pub fn with_budget(budget: TokenBudget) -> Self {
        Self::new(budget, 4.0, 1.1)
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::with_budget(TokenBudget::default())
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count() as f64;
        let base_tokens = char_count / self.chars_per_token;
        let adjusted_tokens = base_tokens * self.safety_margin;

        adjusted_tokens.ceil() as u32
    }

    fn max_usable_tokens(&self) -> u32 {
        self.budget.max_usable_tokens()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to load BPE table: {0}")]
pub struct BpeLoadError(pub String);

/// Token counter using tiktoken-rs BPE tables.
///
/// `o200k_base` for the GPT-4o and o-series families, `cl100k_base` otherwise.
/// For Claude models the count is an approximation, not bit-exact.
pub struct TiktokenCounter {
    bpe: tiktoken_rs::CoreBPE,
    budget: TokenBudget,
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl TiktokenCounter {
    pub fn for_model(model: &str, budget: TokenBudget) -> Result<Self, BpeLoadError> {
        let model_lower = model.to_lowercase();
        let bpe = if uses_o200k(&model_lower) {
            tiktoken_rs::o200k_base()
        } else {
            tiktoken_rs::cl100k_base()
        }
        .map_err(|e| BpeLoadError(e.to_string()))?;

        Ok(Self { bpe, budget })
    }
}

fn uses_o200k(model_lower: &str) -> bool {
    model_lower.contains("gpt-4o")
        || model_lower.starts_with("o1")
        || model_lower.starts_with("o3")
        || model_lower.starts_with("o4")
}

impl TokenCounter for TiktokenCounter {
    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        u32::try_from(self.bpe.encode_with_special_tokens(text).len()).unwrap_or(u32::MAX)
    }

    fn max_usable_tokens(&self) -> u32 {
        self.budget.max_usable_tokens()
    }
}

/// Arc-wrapped token counter for easy sharing.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

/// Create the best available token counter for the given model.
///
/// Known BPE families (GPT, o-series, Claude) get a [`TiktokenCounter`];
/// everything else, or a table that fails to load, gets the heuristic.
pub fn create_token_counter(model: &str, budget: TokenBudget) -> SharedTokenCounter {
    let m = model.to_lowercase();
    let use_tiktoken = m.contains("gpt")
        || m.contains("claude")
        || uses_o200k(&m);

    if use_tiktoken {
        match TiktokenCounter::for_model(model, budget) {
            Ok(counter) => return Arc::new(counter),
            Err(e) => {
                tracing::warn!("{}; falling back to heuristic counting for {}", e, model);
            }
        }
    }

    Arc::new(HeuristicTokenCounter::with_budget(budget))
}
