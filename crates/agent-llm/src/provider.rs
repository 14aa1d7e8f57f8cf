use crate::types::LLMChunk;
use agent_core::{Message, ToolDescriptor};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, LLMError>;

pub type LLMStream = Pin<Box<dyn Stream<Item = Result<LLMChunk>> + Send>>;

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Stream a chat completion.
    ///
    /// # Arguments
    /// * `system` - System instructions, sent outside the message list
    /// * `messages` - Conversation messages, already trimmed to the context budget
    /// * `tools` - Available tools
    /// * `max_output_tokens` - Reserved response allowance
    async fn chat_stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDescriptor],
        max_output_tokens: u32,
    ) -> Result<LLMStream>;

    /// Model identifier used for requests
    fn model(&self) -> &str;
}
