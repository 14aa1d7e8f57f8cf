use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_core::tools::{ToolUse, ToolUseAccumulator};
use agent_core::{AgentError, AgentEvent};
use agent_llm::{LLMChunk, LLMStream, StopReason};

/// Everything one streamed model response produced.
#[derive(Debug, Default)]
pub struct StreamHandlingOutput {
    pub content: String,
    pub tool_uses: Vec<ToolUse>,
    pub stop_reason: Option<StopReason>,
    /// Provider-reported counts; `None` when the stream carried no usage
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl StreamHandlingOutput {
    pub fn requests_tools(&self) -> bool {
        !self.tool_uses.is_empty()
    }
}

pub async fn consume_llm_stream(
    mut stream: LLMStream,
    event_tx: &mpsc::Sender<AgentEvent>,
    cancel_token: &CancellationToken,
    session_id: &str,
) -> Result<StreamHandlingOutput, AgentError> {
    let mut output = StreamHandlingOutput::default();
    let mut tool_uses = ToolUseAccumulator::new();

    loop {
        let chunk_result = tokio::select! {
            _ = cancel_token.cancelled() => return Err(AgentError::Cancelled),
            next = stream.next() => match next {
                Some(chunk_result) => chunk_result,
                None => break,
            },
        };

        match chunk_result {
            Ok(LLMChunk::Token(token)) => {
                output.content.push_str(&token);

                let _ = event_tx.send(AgentEvent::Token { content: token }).await;
            }
            Ok(LLMChunk::ToolUse(delta)) => {
                tracing::trace!(
                    "[{}] Tool use fragment for block {}",
                    session_id,
                    delta.index
                );
                tool_uses.update(delta);
            }
            Ok(LLMChunk::Stop(reason)) => {
                tracing::debug!("[{}] Model stopped: {:?}", session_id, reason);
                output.stop_reason = Some(reason);
            }
            Ok(LLMChunk::Usage {
                input_tokens,
                output_tokens,
            }) => {
                if input_tokens.is_some() {
                    output.input_tokens = input_tokens;
                }
                if output_tokens.is_some() {
                    output.output_tokens = output_tokens;
                }
            }
            Ok(LLMChunk::Done) => {
                tracing::debug!("[{}] LLM stream completed", session_id);
            }
            Err(error) => {
                let message = format!("Stream error: {error}");
                let _ = event_tx.send(AgentEvent::Error { message }).await;
                return Err(AgentError::LLM(error.to_string()));
            }
        }
    }

    output.tool_uses = tool_uses.finalize();
    if output.stop_reason == Some(StopReason::ToolUse) && output.tool_uses.is_empty() {
        tracing::warn!(
            "[{}] Model stopped for tool use but no complete tool use was streamed",
            session_id
        );
    }

    Ok(output)
}
