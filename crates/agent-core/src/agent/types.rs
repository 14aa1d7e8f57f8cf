use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::agent::error::HistoryError;
use crate::tools::ToolUse;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A typed piece of structured message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse(ToolUse),
    ToolResult {
        tool_use_id: String,
        content: Value,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<Value>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self::Blocks(blocks)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(
        default = "generate_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Builds the user message that answers every tool use of an assistant turn.
    pub fn tool_results<I, S>(results: I) -> Self
    where
        I: IntoIterator<Item = (S, String)>,
        S: Into<String>,
    {
        let blocks = results
            .into_iter()
            .map(|(id, content)| ContentBlock::tool_result(id, content))
            .collect::<Vec<_>>();
        Self::user(blocks)
    }

    pub fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUse> {
        self.blocks().iter().filter_map(|block| match block {
            ContentBlock::ToolUse(tool_use) => Some(tool_use),
            _ => None,
        })
    }

    pub fn tool_use_ids(&self) -> HashSet<&str> {
        self.tool_uses().map(|tool_use| tool_use.id.as_str()).collect()
    }

    pub fn tool_result_ids(&self) -> HashSet<&str> {
        self.blocks()
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.tool_uses().next().is_some()
    }

    pub fn has_tool_result(&self) -> bool {
        self.blocks()
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolResult { .. }))
    }

    /// Concatenated text of the message, ignoring tool blocks.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Per-user chat state. History is append-only; tool exchanges enter it as a pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Model name for this session (e.g., "claude-3-5-sonnet-20240620")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            model: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Appends a message that carries no tool blocks.
    ///
    /// Tool uses and tool results must go through [`Session::append_tool_exchange`].
    pub fn add_message(&mut self, message: Message) -> Result<(), HistoryError> {
        if message.has_tool_use() || message.has_tool_result() {
            return Err(HistoryError::ToolBlocksOutsideExchange);
        }
        self.push(message);
        Ok(())
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) {
        self.push(Message::user(text.into()));
    }

    pub fn add_assistant_message(&mut self, text: impl Into<String>) {
        self.push(Message::assistant(text.into()));
    }

    /// Appends an assistant tool-use message and the user message holding its
    /// results as one unit. Nothing is appended unless every tool use has exactly
    /// one matching result.
    pub fn append_tool_exchange(
        &mut self,
        assistant: Message,
        results: Message,
    ) -> Result<(), HistoryError> {
        validate_tool_exchange(&assistant, &results)?;
        self.messages.reserve(2);
        self.push(assistant);
        self.push(results);
        Ok(())
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

fn validate_tool_exchange(assistant: &Message, results: &Message) -> Result<(), HistoryError> {
    if assistant.role != Role::Assistant || !assistant.has_tool_use() {
        return Err(HistoryError::MalformedExchange(
            "first message must be an assistant message with tool uses".to_string(),
        ));
    }
    if assistant.has_tool_result() {
        return Err(HistoryError::MalformedExchange(
            "assistant message cannot carry tool results".to_string(),
        ));
    }
    if results.role != Role::User || results.has_tool_use() {
        return Err(HistoryError::MalformedExchange(
            "second message must be a user message with tool results".to_string(),
        ));
    }

    let requested = assistant.tool_use_ids();
    let answered = results.tool_result_ids();

    let result_count = results
        .blocks()
        .iter()
        .filter(|block| matches!(block, ContentBlock::ToolResult { .. }))
        .count();
    if result_count != answered.len() {
        return Err(HistoryError::MalformedExchange(
            "duplicate tool result for the same tool use".to_string(),
        ));
    }

    if let Some(orphan) = answered.iter().find(|id| !requested.contains(*id)) {
        return Err(HistoryError::UnpairedToolResult {
            tool_use_id: orphan.to_string(),
        });
    }
    if let Some(missing) = requested.iter().find(|id| !answered.contains(*id)) {
        return Err(HistoryError::MissingToolResult {
            tool_use_id: missing.to_string(),
        });
    }

    Ok(())
}
