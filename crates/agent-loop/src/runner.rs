use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agent_core::agent::events::{TokenBudgetUsage, TokenUsage};
use agent_core::budget::PreparedContext;
use agent_core::tools::{execute_tool_call, ToolExecutor, ToolResult, ToolUse};
use agent_core::{
    AgentError, AgentEvent, ContentBlock, ContextBudgeter, Message, Session, TokenCounter,
};
use agent_llm::LLMProvider;

use crate::config::AgentLoopConfig;
use crate::stream::handler::{consume_llm_stream, StreamHandlingOutput};

pub type Result<T> = std::result::Result<T, AgentError>;

/// Runs one user turn to completion.
///
/// Each round resubmits the whole history and the current tool catalogue to
/// the budgeter, streams the model's answer and, when it asks for tools, runs
/// every requested tool and appends the call and its results as one exchange.
/// The turn ends when a response requests no tools, after `max_rounds` calls,
/// or on cancellation.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent_loop_with_config(
    session: &mut Session,
    initial_message: String,
    event_tx: mpsc::Sender<AgentEvent>,
    llm: Arc<dyn LLMProvider>,
    tools: Arc<dyn ToolExecutor>,
    budgeter: &ContextBudgeter,
    cancel_token: CancellationToken,
    config: AgentLoopConfig,
) -> Result<()> {
    let session_id = session.id.clone();

    tracing::debug!(
        "[{}] Starting agent loop with message: {}",
        session_id,
        initial_message
    );

    session.add_user_message(initial_message);

    let mut usage = TokenUsage::default();
    let mut sent_complete = false;

    for round in 0..config.max_rounds {
        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        tracing::debug!(
            "[{}] Round {}/{} with {} history messages",
            session_id,
            round + 1,
            config.max_rounds,
            session.len()
        );

        let tool_catalogue = tools.list_tools();
        let prepared = budgeter.prepare(session.messages(), &tool_catalogue, &config.system_prompt);

        let _ = event_tx
            .send(AgentEvent::TokenBudgetUpdated {
                usage: TokenBudgetUsage::from(&prepared),
            })
            .await;

        // An empty messages array is rejected by the provider, so the turn ends here
        // instead of sending only the system prompt and tools.
        if prepared.messages.is_empty() {
            let message = budget_exhausted_message(&prepared, tool_catalogue.len());
            let _ = event_tx
                .send(AgentEvent::Error {
                    message: message.clone(),
                })
                .await;
            return Err(AgentError::BudgetExhausted(message));
        }

        let timer = Timer::new("llm_request");
        let stream = match llm
            .chat_stream(
                &config.system_prompt,
                &prepared.messages,
                &tool_catalogue,
                config.max_output_tokens,
            )
            .await
        {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!("[{}] LLM request failed: {}", session_id, error);
                let _ = event_tx
                    .send(AgentEvent::Error {
                        message: format!("Error calling {}: {}", llm.model(), error),
                    })
                    .await;
                return Err(AgentError::LLM(error.to_string()));
            }
        };

        let stream_output = consume_llm_stream(stream, &event_tx, &cancel_token, &session_id).await?;
        timer.debug(&session_id);

        usage.add(
            stream_output
                .input_tokens
                .unwrap_or(prepared.token_usage.total_tokens),
            stream_output
                .output_tokens
                .unwrap_or_else(|| budgeter.counter().count_text(&stream_output.content)),
        );

        if !stream_output.requests_tools() {
            if stream_output.content.is_empty() {
                tracing::warn!("[{}] Model returned an empty response", session_id);
            } else {
                session.add_assistant_message(stream_output.content);
            }

            let _ = event_tx
                .send(AgentEvent::Complete {
                    usage: usage.clone(),
                })
                .await;
            sent_complete = true;
            break;
        }

        let (assistant, results) =
            run_tool_round(stream_output, &event_tx, tools.as_ref(), &cancel_token, &session_id)
                .await?;
        session.append_tool_exchange(assistant, results)?;
    }

    if !sent_complete {
        tracing::warn!(
            "[{}] Stopped after {} rounds without a final answer",
            session_id,
            config.max_rounds
        );
        let _ = event_tx.send(AgentEvent::Complete { usage }).await;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_agent_loop(
    session: &mut Session,
    initial_message: String,
    event_tx: mpsc::Sender<AgentEvent>,
    llm: Arc<dyn LLMProvider>,
    tools: Arc<dyn ToolExecutor>,
    budgeter: &ContextBudgeter,
    cancel_token: CancellationToken,
    max_rounds: usize,
) -> Result<()> {
    run_agent_loop_with_config(
        session,
        initial_message,
        event_tx,
        llm,
        tools,
        budgeter,
        cancel_token,
        AgentLoopConfig {
            max_rounds,
            ..Default::default()
        },
    )
    .await
}

/// Executes every tool use of one response, in order, and builds the
/// assistant message and the tool-result message that answer it.
async fn run_tool_round(
    stream_output: StreamHandlingOutput,
    event_tx: &mpsc::Sender<AgentEvent>,
    tools: &dyn ToolExecutor,
    cancel_token: &CancellationToken,
    session_id: &str,
) -> Result<(Message, Message)> {
    let mut results = Vec::with_capacity(stream_output.tool_uses.len());

    for tool_use in &stream_output.tool_uses {
        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let _ = event_tx
            .send(AgentEvent::ToolStart {
                tool_use_id: tool_use.id.clone(),
                tool_name: tool_use.name.clone(),
                input: tool_use.input.clone(),
            })
            .await;

        let tool_timer = Timer::new(format!("tool_{}", tool_use.name));
        let result = execute_tool_call(tool_use, tools).await;
        tool_timer.debug(session_id);

        let event = if result.success {
            AgentEvent::ToolComplete {
                tool_use_id: tool_use.id.clone(),
                result: result.clone(),
            }
        } else {
            tracing::warn!(
                "[{}] Tool {} returned an error: {}",
                session_id,
                tool_use.name,
                result.result
            );
            AgentEvent::ToolError {
                tool_use_id: tool_use.id.clone(),
                error: error_text(&result),
            }
        };
        let _ = event_tx.send(event).await;

        results.push((tool_use.id.clone(), result.result));
    }

    let assistant = tool_use_message(stream_output.content, stream_output.tool_uses);
    Ok((assistant, Message::tool_results(results)))
}

fn budget_exhausted_message(prepared: &PreparedContext, tool_count: usize) -> String {
    let usage = &prepared.token_usage;
    let reserved = usage.system_tokens.saturating_add(usage.tool_tokens);
    if reserved >= usage.budget_limit {
        format!(
            "system prompt and {} tools use {} of {} tokens, leaving no room for the conversation",
            tool_count, reserved, usage.budget_limit
        )
    } else {
        format!(
            "the newest message does not fit in the {} tokens left after the system prompt and {} tools",
            usage.budget_limit - reserved,
            tool_count
        )
    }
}

fn tool_use_message(content: String, tool_uses: Vec<ToolUse>) -> Message {
    let mut blocks = Vec::with_capacity(tool_uses.len() + 1);
    if !content.is_empty() {
        blocks.push(ContentBlock::text(content));
    }
    blocks.extend(tool_uses.into_iter().map(ContentBlock::ToolUse));
    Message::assistant(blocks)
}

/// The message inside an `{"error": ...}` payload, or the raw result.
fn error_text(result: &ToolResult) -> String {
    serde_json::from_str::<serde_json::Value>(&result.result)
        .ok()
        .and_then(|payload| payload.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| result.result.clone())
}

struct Timer {
    name: String,
    start: std::time::Instant,
}

impl Timer {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: std::time::Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    fn debug(&self, session_id: &str) {
        tracing::debug!(
            "[{}] {} completed in {}ms",
            session_id,
            self.name,
            self.elapsed_ms()
        );
    }
}
