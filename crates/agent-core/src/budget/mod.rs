//! Token budget management for LLM conversations.
//!
//! Every turn the full history is re-trimmed from scratch: the system prompt and
//! the tool catalogue are charged first, then the most recent messages are kept
//! until the model's usable context is filled.
//!
//! # Key Components
//!
//! - [`types`]: `TokenBudget`, `PreparedContext`, `TokenUsageBreakdown`
//! - [`counter`]: Token counting (tiktoken BPE tables, heuristic fallback)
//! - [`limits`]: Model context window limits registry
//! - [`segmenter`]: Groups tool-use/tool-result pairs into atomic units
//! - [`preparation`]: Most-recent-first suffix selection

pub mod counter;
pub mod limits;
pub mod preparation;
pub mod segmenter;
pub mod types;

pub use counter::{
    create_token_counter, BpeLoadError, HeuristicTokenCounter, SharedTokenCounter,
    TiktokenCounter, TokenCounter,
};
pub use limits::{create_budget_for_model, ModelLimit, ModelLimitsRegistry};
pub use preparation::{prepare_context, ContextBudgeter};
pub use segmenter::{MessageSegment, MessageSegmenter};
pub use types::{PreparedContext, TokenBudget, TokenUsageBreakdown};
