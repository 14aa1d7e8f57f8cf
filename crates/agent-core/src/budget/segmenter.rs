//! Message segmentation for budget management.
//!
//! Groups messages into atomic segments, ensuring tool-use chains stay together.
//! A tool result sent without the assistant message that requested it is rejected
//! by the model API, so an assistant tool-use message and the user message carrying
//! its results are always kept or dropped as one unit.

use std::collections::HashSet;
use std::ops::Range;

use crate::agent::types::{Message, Role};

/// A segment of conversation that is treated as atomic during truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSegment {
    /// Position of the segment's messages within the segmented slice
    pub range: Range<usize>,
    /// Tool use IDs referenced in this segment
    pub tool_use_ids: HashSet<String>,
    /// Whether this segment is a tool-use message together with its results
    pub is_tool_chain: bool,
    /// Token count, filled in by the budgeter
    pub token_estimate: u32,
}

impl MessageSegment {
    fn single(index: usize, message: &Message) -> Self {
        let tool_use_ids: HashSet<String> = message
            .tool_use_ids()
            .into_iter()
            .chain(message.tool_result_ids())
            .map(str::to_string)
            .collect();
        Self {
            range: index..index + 1,
            tool_use_ids,
            is_tool_chain: false,
            token_estimate: 0,
        }
    }

    fn chain(index: usize, assistant: &Message) -> Self {
        Self {
            range: index..index + 2,
            tool_use_ids: assistant
                .tool_use_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
            is_tool_chain: true,
            token_estimate: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn messages<'a>(&self, messages: &'a [Message]) -> &'a [Message] {
        &messages[self.range.clone()]
    }
}

/// Segments messages into atomic units for budget management.
///
/// # Algorithm
///
/// 1. An assistant message with tool uses, followed by a user message with tool
///    results for those uses, forms one segment
/// 2. Every other message is its own segment
/// 3. Dangling tool uses and orphan tool results are logged and kept standalone
#[derive(Debug, Default)]
pub struct MessageSegmenter;

impl MessageSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// Segment messages, ensuring tool-use chains stay together.
    ///
    /// Returns segments in chronological order (oldest first) covering every
    /// message exactly once.
    pub fn segment(&self, messages: &[Message]) -> Vec<MessageSegment> {
        let mut segments = Vec::with_capacity(messages.len());
        let mut index = 0;

        while index < messages.len() {
            let message = &messages[index];

            if message.role == Role::Assistant && message.has_tool_use() {
                let answered_by_next = messages
                    .get(index + 1)
                    .filter(|next| next.role == Role::User && next.has_tool_result())
                    .map(|next| {
                        let requested = message.tool_use_ids();
                        next.tool_result_ids().iter().all(|id| requested.contains(id))
                    })
                    .unwrap_or(false);

                if answered_by_next {
                    segments.push(MessageSegment::chain(index, message));
                    index += 2;
                    continue;
                }

                tracing::warn!(
                    "Tool use without results at message {}: {:?}",
                    index,
                    message.tool_use_ids()
                );
            } else if message.has_tool_result() {
                tracing::warn!(
                    "Orphan tool result without preceding tool use at message {}: {:?}",
                    index,
                    message.tool_result_ids()
                );
            }

            segments.push(MessageSegment::single(index, message));
            index += 1;
        }

        segments
    }
}
