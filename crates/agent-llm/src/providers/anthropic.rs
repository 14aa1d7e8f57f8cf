//! Anthropic provider and request-building helpers.

use std::collections::HashSet;

use agent_core::budget::counter::tool_result_text;
use agent_core::tools::ToolUseDelta;
use agent_core::{ContentBlock, Message, MessageContent, Role, ToolDescriptor};
use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client};
use serde_json::{json, Value};

use crate::provider::{LLMError, LLMProvider, LLMStream, Result};
use crate::types::{LLMChunk, StopReason};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        use reqwest::header::{HeaderValue, CONTENT_TYPE};

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| LLMError::Auth(format!("Invalid API key: {}", e)))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn chat_stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDescriptor],
        max_output_tokens: u32,
    ) -> Result<LLMStream> {
        let body = build_anthropic_request(system, messages, tools, &self.model, max_output_tokens, true);
        let headers = self.build_headers()?;

        tracing::debug!(
            "Anthropic request: model={}, messages={}, tools={}, max_tokens={}",
            self.model,
            messages.len(),
            tools.len(),
            max_output_tokens
        );

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(LLMError::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.map_err(LLMError::Http)?;

            if status == 401 || status == 403 {
                return Err(LLMError::Auth(format!(
                    "Anthropic authentication failed: {}. Please check your API key.",
                    text
                )));
            }

            return Err(LLMError::Api(format!(
                "Anthropic API error: HTTP {}: {}",
                status, text
            )));
        }

        let mut state = AnthropicStreamState::default();

        let stream = crate::providers::common::sse::llm_stream_from_sse(response, move |event, data| {
            parse_anthropic_sse_event(&mut state, event, data)
        });

        Ok(stream)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build an Anthropic Messages API request body.
///
/// Pure conversion: internal fields like message `id`/`created_at` are omitted,
/// and `system`/`tools` are left out when empty.
pub fn build_anthropic_request(
    system: &str,
    messages: &[Message],
    tools: &[ToolDescriptor],
    model: &str,
    max_tokens: u32,
    stream: bool,
) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "stream": stream,
        "messages": messages.iter().map(message_to_anthropic_json).collect::<Vec<_>>(),
    });

    if !system.is_empty() {
        body["system"] = json!(system);
    }
    if !tools.is_empty() {
        body["tools"] = json!(tools_to_anthropic_json(tools));
    }

    body
}

fn message_to_anthropic_json(message: &Message) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let content = match &message.content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Blocks(blocks) => {
            Value::Array(blocks.iter().map(block_to_anthropic_json).collect())
        }
    };

    json!({
        "role": role,
        "content": content,
    })
}

fn block_to_anthropic_json(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({
            "type": "text",
            "text": text,
        }),
        ContentBlock::ToolUse(tool_use) => {
            let input = if tool_use.input.is_null() {
                json!({})
            } else {
                tool_use.input.clone()
            };
            json!({
                "type": "tool_use",
                "id": tool_use.id,
                "name": tool_use.name,
                "input": input,
            })
        }
        ContentBlock::ToolResult {
            tool_use_id,
            content,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": tool_result_text(content),
        }),
    }
}

fn tools_to_anthropic_json(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            })
        })
        .collect()
}

/// Stateful parser for Anthropic SSE streaming events.
///
/// Tracks which content block indices are tool uses so input deltas can be
/// routed to the right accumulator entry.
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    open_tool_uses: HashSet<usize>,
}

fn parse_data(data: &str) -> Result<Option<Value>> {
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(data)?))
}

fn usage_chunk(usage: &Value) -> Option<LLMChunk> {
    let read = |key: &str| {
        usage
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
    };
    let input_tokens = read("input_tokens");
    let output_tokens = read("output_tokens");
    if input_tokens.is_none() && output_tokens.is_none() {
        return None;
    }
    Some(LLMChunk::Usage {
        input_tokens,
        output_tokens,
    })
}

/// Parse a single Anthropic SSE event into stream chunks.
///
/// Returns:
/// - chunks for content-bearing events (text deltas, tool uses, stop reason, usage, message_stop)
/// - an empty vector for non-content events (pings, text block starts, etc.)
/// - `Err(_)` for malformed JSON, unexpected shapes and `error` events
pub fn parse_anthropic_sse_event(
    state: &mut AnthropicStreamState,
    event_type: &str,
    data: &str,
) -> Result<Vec<LLMChunk>> {
    match event_type {
        "message_stop" => Ok(vec![LLMChunk::Done]),
        "error" => Err(LLMError::Api(format!("Anthropic error event: {data}"))),
        "message_start" => {
            let Some(v) = parse_data(data)? else {
                return Ok(Vec::new());
            };
            Ok(v.pointer("/message/usage")
                .and_then(usage_chunk)
                .into_iter()
                .collect())
        }
        "message_delta" => {
            let Some(v) = parse_data(data)? else {
                return Ok(Vec::new());
            };
            let mut chunks = Vec::new();
            if let Some(reason) = v.pointer("/delta/stop_reason").and_then(|r| r.as_str()) {
                chunks.push(LLMChunk::Stop(StopReason::parse(reason)));
            }
            if let Some(usage) = v.get("usage").and_then(usage_chunk) {
                chunks.push(usage);
            }
            Ok(chunks)
        }
        "content_block_start" => {
            let Some(v) = parse_data(data)? else {
                return Ok(Vec::new());
            };
            let Some(index) = v.get("index").and_then(|i| i.as_u64()) else {
                return Err(LLMError::Stream(format!(
                    "Anthropic content_block_start missing index: {data}"
                )));
            };
            let Some(content_block) = v.get("content_block") else {
                return Err(LLMError::Stream(format!(
                    "Anthropic content_block_start missing content_block: {data}"
                )));
            };

            let block_type = content_block
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or_default();

            match block_type {
                "text" => {
                    let text = content_block
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default();
                    if text.is_empty() {
                        Ok(Vec::new())
                    } else {
                        Ok(vec![LLMChunk::Token(text.to_string())])
                    }
                }
                "tool_use" => {
                    let Some(id) = content_block.get("id").and_then(|s| s.as_str()) else {
                        return Err(LLMError::Stream(format!(
                            "Anthropic tool_use content_block missing id: {data}"
                        )));
                    };
                    let Some(name) = content_block.get("name").and_then(|s| s.as_str()) else {
                        return Err(LLMError::Stream(format!(
                            "Anthropic tool_use content_block missing name: {data}"
                        )));
                    };

                    let index = index as usize;
                    state.open_tool_uses.insert(index);

                    Ok(vec![LLMChunk::ToolUse(ToolUseDelta::start(index, id, name))])
                }
                _ => Ok(Vec::new()),
            }
        }
        "content_block_delta" => {
            let Some(v) = parse_data(data)? else {
                return Ok(Vec::new());
            };
            let Some(delta) = v.get("delta") else {
                return Ok(Vec::new());
            };

            let delta_type = delta
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or_default();

            match delta_type {
                "text_delta" => {
                    let text = delta
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default();
                    Ok(vec![LLMChunk::Token(text.to_string())])
                }
                "input_json_delta" => {
                    let Some(index) = v.get("index").and_then(|i| i.as_u64()) else {
                        return Err(LLMError::Stream(format!(
                            "Anthropic input_json_delta missing index: {data}"
                        )));
                    };
                    let index = index as usize;
                    if !state.open_tool_uses.contains(&index) {
                        return Err(LLMError::Stream(format!(
                            "Anthropic input_json_delta for unknown tool_use index {index}: {data}"
                        )));
                    }

                    let partial = delta
                        .get("partial_json")
                        .and_then(|p| p.as_str())
                        .unwrap_or_default();

                    Ok(vec![LLMChunk::ToolUse(ToolUseDelta::input(index, partial))])
                }
                _ => Ok(Vec::new()),
            }
        }
        "content_block_stop" => {
            if let Some(v) = parse_data(data)? {
                if let Some(index) = v.get("index").and_then(|i| i.as_u64()) {
                    state.open_tool_uses.remove(&(index as usize));
                }
            }
            Ok(Vec::new())
        }
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod anthropic_request_building {
    use agent_core::{ContentBlock, Message, ToolDescriptor, ToolUse};
    use serde_json::json;

    #[test]
    fn system_prompt_goes_into_top_level_system_field() {
        let messages = vec![Message::user("Hi"), Message::assistant("Hello!")];

        let out = super::build_anthropic_request("You are helpful.", &messages, &[], "claude-test", 64, false);

        assert_eq!(out["system"], "You are helpful.");
        assert_eq!(out["messages"].as_array().unwrap().len(), 2);
        assert_eq!(out["messages"][0]["content"], "Hi");
        assert!(out["messages"][0].get("id").is_none());
    }

    #[test]
    fn empty_system_and_tools_are_omitted() {
        let out = super::build_anthropic_request("", &[], &[], "claude-test", 64, false);

        assert!(out.get("system").is_none());
        assert!(out.get("tools").is_none());
        assert_eq!(out["messages"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn tool_results_keep_their_block_shape() {
        let messages = vec![Message::tool_results([("toolu_1", "OK".to_string())])];

        let out = super::build_anthropic_request("", &messages, &[], "claude-test", 64, false);

        assert_eq!(out["messages"][0]["role"], "user");
        assert_eq!(out["messages"][0]["content"][0]["type"], "tool_result");
        assert_eq!(out["messages"][0]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(out["messages"][0]["content"][0]["content"], "OK");
    }

    #[test]
    fn structured_tool_result_content_is_stringified() {
        let messages = vec![Message::user(vec![ContentBlock::tool_result(
            "toolu_1",
            json!({"rows": 2}),
        )])];

        let out = super::build_anthropic_request("", &messages, &[], "claude-test", 64, false);

        assert_eq!(out["messages"][0]["content"][0]["content"], r#"{"rows":2}"#);
    }

    #[test]
    fn assistant_tool_uses_become_tool_use_blocks() {
        let messages = vec![Message::assistant(vec![
            ContentBlock::text("Let me search for that."),
            ContentBlock::ToolUse(ToolUse {
                id: "toolu_1".to_string(),
                name: "search".to_string(),
                input: json!({"q": "test"}),
            }),
        ])];

        let out = super::build_anthropic_request("", &messages, &[], "claude-test", 64, false);

        let content = &out["messages"][0]["content"];
        assert_eq!(out["messages"][0]["role"], "assistant");
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["type"], "tool_use");
        assert_eq!(content[1]["id"], "toolu_1");
        assert_eq!(content[1]["input"]["q"], "test");
    }

    #[test]
    fn tools_use_anthropic_schema_shape() {
        let tools = vec![ToolDescriptor::new(
            "search",
            "Search the web",
            json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        )];

        let out = super::build_anthropic_request("", &[], &tools, "claude-test", 64, false);

        assert_eq!(out["tools"][0]["name"], "search");
        assert_eq!(out["tools"][0]["description"], "Search the web");
        assert_eq!(out["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn model_stream_and_max_tokens_included() {
        let messages = vec![Message::user("Hello")];
        let out = super::build_anthropic_request("", &messages, &[], "claude-3-opus-20240229", 2048, true);

        assert_eq!(out["model"], "claude-3-opus-20240229");
        assert_eq!(out["max_tokens"], 2048);
        assert_eq!(out["stream"], true);
    }
}
