//! Context preparation for budget management.
//!
//! Selects the most recent contiguous suffix of a conversation that fits the
//! model's usable context once the system prompt and tool catalogue are charged.

use crate::agent::types::{Message, Role};
use crate::budget::counter::{SharedTokenCounter, TokenCounter};
use crate::budget::segmenter::MessageSegmenter;
use crate::budget::types::{PreparedContext, TokenUsageBreakdown};
use crate::tools::ToolDescriptor;

/// Per-turn history trimmer bound to one model's token counter.
#[derive(Clone)]
pub struct ContextBudgeter {
    counter: SharedTokenCounter,
}

impl ContextBudgeter {
    pub fn new(counter: SharedTokenCounter) -> Self {
        Self { counter }
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    /// Returns the messages to send: a contiguous, chronologically ordered suffix
    /// of `history`.
    pub fn select(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
        system_prompt: &str,
    ) -> Vec<Message> {
        self.prepare(history, tools, system_prompt).messages
    }

    /// Same selection as [`ContextBudgeter::select`], with a usage breakdown.
    pub fn prepare(
        &self,
        history: &[Message],
        tools: &[ToolDescriptor],
        system_prompt: &str,
    ) -> PreparedContext {
        prepare_context(history, tools, system_prompt, self.counter.as_ref())
    }
}

impl std::fmt::Debug for ContextBudgeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextBudgeter")
            .field("max_usable_tokens", &self.counter.max_usable_tokens())
            .finish()
    }
}

/// Prepare context for an LLM call with budget enforcement.
///
/// # Algorithm
///
/// 1. `available = max_usable - tokens(system_prompt) - tokens(tools)`, signed
/// 2. Segment history so tool-use chains are atomic
/// 3. Walk segments newest to oldest, keeping each while the running total
///    stays within `available`
/// 4. Stop at the first segment that does not fit; older segments are never
///    considered even if they are smaller
///
/// History is never mutated. When `available <= 0` the result is empty.
pub fn prepare_context(
    history: &[Message],
    tools: &[ToolDescriptor],
    system_prompt: &str,
    counter: &dyn TokenCounter,
) -> PreparedContext {
    let max_tokens = counter.max_usable_tokens();
    let system_tokens = counter.count_text(system_prompt);
    let tool_tokens = counter.count_tools(tools);

    let available = i64::from(max_tokens) - i64::from(system_tokens) - i64::from(tool_tokens);

    tracing::debug!(
        "Budget: max_usable={}, system={}, tools={} ({} tools), remaining={}",
        max_tokens,
        system_tokens,
        tool_tokens,
        tools.len(),
        available
    );

    let usage = |window_tokens: u32| TokenUsageBreakdown {
        system_tokens,
        tool_tokens,
        window_tokens,
        total_tokens: system_tokens
            .saturating_add(tool_tokens)
            .saturating_add(window_tokens),
        budget_limit: max_tokens,
    };

    if available <= 0 {
        tracing::warn!(
            "System prompt and tools ({} tokens) leave no room for history (max {}), sending no messages",
            i64::from(system_tokens) + i64::from(tool_tokens),
            max_tokens
        );
        return PreparedContext {
            messages: Vec::new(),
            token_usage: usage(0),
            truncation_occurred: !history.is_empty(),
            messages_removed: history.len(),
        };
    }

    let mut segments = MessageSegmenter::new().segment(history);
    for segment in &mut segments {
        segment.token_estimate = counter.count_messages(segment.messages(history));
    }

    let mut running: i64 = 0;
    let mut start = history.len();

    for segment in segments.iter().rev() {
        let cost = i64::from(segment.token_estimate);
        if running + cost > available {
            tracing::debug!(
                "Segment at {:?} ({} tokens) does not fit ({} of {} used), stopping",
                segment.range,
                cost,
                running,
                available
            );
            break;
        }
        running += cost;
        start = segment.range.start;
        tracing::debug!(
            "Kept segment at {:?}: {} tokens, running total {}",
            segment.range,
            cost,
            running
        );
    }

    let messages = history[start..].to_vec();
    let window_tokens = u32::try_from(running).unwrap_or(u32::MAX);

    if messages.first().is_some_and(|m| m.role == Role::Assistant) {
        tracing::warn!(
            "Kept history starts with an assistant message; providers that require a leading user turn may reject it"
        );
    }

    if start > 0 {
        tracing::debug!(
            "Truncated history: kept {} of {} messages ({} tokens)",
            messages.len(),
            history.len(),
            window_tokens
        );
    }

    PreparedContext {
        messages,
        token_usage: usage(window_tokens),
        truncation_occurred: start > 0,
        messages_removed: start,
    }
}
