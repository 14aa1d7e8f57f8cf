pub mod config;
pub mod runner;
pub mod stream;

pub use config::AgentLoopConfig;
pub use runner::{run_agent_loop, run_agent_loop_with_config};

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures::stream;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use agent_core::budget::{HeuristicTokenCounter, TokenBudget};
    use agent_core::tools::{ToolDescriptor, ToolError, ToolExecutor, ToolResult, ToolUse, ToolUseDelta};
    use agent_core::{
        AgentError, AgentEvent, ContentBlock, ContextBudgeter, Message, Role, Session,
        TokenCounter,
    };
    use agent_llm::provider::Result as LLMResult;
    use agent_llm::{LLMChunk, LLMError, LLMProvider, LLMStream, StopReason};

    use crate::config::AgentLoopConfig;
    use crate::runner::run_agent_loop_with_config;

    type Script = Vec<LLMResult<LLMChunk>>;

    #[derive(Debug, Clone)]
    struct RecordedRequest {
        system: String,
        messages: Vec<Message>,
        tool_names: Vec<String>,
        max_output_tokens: u32,
    }

    /// Replays one scripted response per request and records what it was sent.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<RecordedRequest>>,
        repeat_last: bool,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                repeat_last: false,
            })
        }

        fn always(response: Script) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(vec![response].into()),
                requests: Mutex::new(Vec::new()),
                repeat_last: true,
            })
        }

        fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn chat_stream(
            &self,
            system: &str,
            messages: &[Message],
            tools: &[ToolDescriptor],
            max_output_tokens: u32,
        ) -> LLMResult<LLMStream> {
            self.requests.lock().unwrap().push(RecordedRequest {
                system: system.to_string(),
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
                max_output_tokens,
            });

            let mut responses = self.responses.lock().unwrap();
            let script = if self.repeat_last {
                responses.front().map(|script| {
                    script
                        .iter()
                        .map(|chunk| match chunk {
                            Ok(chunk) => Ok(chunk.clone()),
                            Err(error) => Err(LLMError::Api(error.to_string())),
                        })
                        .collect::<Vec<_>>()
                })
            } else {
                responses.pop_front()
            };

            match script {
                Some(script) => Ok(Box::pin(stream::iter(script))),
                None => Err(LLMError::Api("overloaded_error: Overloaded".to_string())),
            }
        }

        fn model(&self) -> &str {
            "claude-3-5-sonnet-20240620"
        }
    }

    /// Echoes its input for known tools.
    struct EchoTools {
        names: Vec<&'static str>,
    }

    #[async_trait]
    impl ToolExecutor for EchoTools {
        async fn execute(&self, call: &ToolUse) -> Result<ToolResult, ToolError> {
            if call.name == "broken" {
                return Ok(ToolResult::error("Error executing tool broken: connection closed"));
            }
            if !self.names.contains(&call.name.as_str()) {
                return Err(ToolError::NotFound(call.name.clone()));
            }
            Ok(ToolResult::ok(format!("{} -> {}", call.name, call.input)))
        }

        fn list_tools(&self) -> Vec<ToolDescriptor> {
            self.names
                .iter()
                .map(|name| ToolDescriptor::new(*name, "echo tool", json!({"type": "object"})))
                .collect()
        }
    }

    /// One token per character, with a fixed usable budget.
    struct CharCounter {
        max_usable: u32,
    }

    impl TokenCounter for CharCounter {
        fn count_text(&self, text: &str) -> u32 {
            text.chars().count() as u32
        }

        fn max_usable_tokens(&self) -> u32 {
            self.max_usable
        }
    }

    fn text_response(text: &str) -> Script {
        vec![
            Ok(LLMChunk::Usage {
                input_tokens: Some(25),
                output_tokens: Some(1),
            }),
            Ok(LLMChunk::Token(text.to_string())),
            Ok(LLMChunk::Stop(StopReason::EndTurn)),
            Ok(LLMChunk::Usage {
                input_tokens: None,
                output_tokens: Some(5),
            }),
            Ok(LLMChunk::Done),
        ]
    }

    fn tool_response(id: &str, name: &str, input: &str) -> Script {
        vec![
            Ok(LLMChunk::Token("Let me look that up.".to_string())),
            Ok(LLMChunk::ToolUse(ToolUseDelta::start(1, id, name))),
            Ok(LLMChunk::ToolUse(ToolUseDelta::input(1, input))),
            Ok(LLMChunk::Stop(StopReason::ToolUse)),
            Ok(LLMChunk::Done),
        ]
    }

    fn default_budgeter() -> ContextBudgeter {
        ContextBudgeter::new(Arc::new(HeuristicTokenCounter::with_budget(
            TokenBudget::for_model(200_000),
        )))
    }

    fn config(max_rounds: usize) -> AgentLoopConfig {
        AgentLoopConfig {
            max_rounds,
            system_prompt: "You are a helpful assistant.".to_string(),
            ..Default::default()
        }
    }

    fn drain(event_rx: &mut mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn agent_loop_config_default() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.max_rounds, 50);
        assert!(config.system_prompt.is_empty());
        assert_eq!(config.max_output_tokens, 1024);
    }

    #[tokio::test]
    async fn text_answer_completes_turn() {
        let provider = ScriptedProvider::new(vec![text_response("Hello there")]);
        let tools = Arc::new(EchoTools { names: vec!["search"] });
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let mut session = Session::new("s1");

        run_agent_loop_with_config(
            &mut session,
            "Hi".to_string(),
            event_tx,
            provider.clone(),
            tools,
            &default_budgeter(),
            CancellationToken::new(),
            config(10),
        )
        .await
        .unwrap();

        assert_eq!(session.len(), 2);
        assert_eq!(session.messages()[1].text(), "Hello there");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, "You are a helpful assistant.");
        assert_eq!(requests[0].tool_names, vec!["search"]);
        assert_eq!(requests[0].max_output_tokens, 1024);

        let events = drain(&mut event_rx);
        assert!(matches!(events[0], AgentEvent::TokenBudgetUpdated { .. }));
        assert!(matches!(&events[1], AgentEvent::Token { content } if content == "Hello there"));
        match events.last().unwrap() {
            AgentEvent::Complete { usage } => {
                assert_eq!(usage.prompt_tokens, 25);
                assert_eq!(usage.completion_tokens, 5);
                assert_eq!(usage.total_tokens, 30);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_use_round_appends_exchange_and_loops() {
        let provider = ScriptedProvider::new(vec![
            tool_response("toolu_1", "search", r#"{"q":"rust"}"#),
            text_response("Rust is a language."),
        ]);
        let tools = Arc::new(EchoTools { names: vec!["search"] });
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let mut session = Session::new("s2");

        run_agent_loop_with_config(
            &mut session,
            "What is rust?".to_string(),
            event_tx,
            provider.clone(),
            tools,
            &default_budgeter(),
            CancellationToken::new(),
            config(10),
        )
        .await
        .unwrap();

        let messages = session.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].text(), "Let me look that up.");
        assert_eq!(messages[1].tool_uses().count(), 1);
        assert_eq!(
            messages[2].blocks()[0],
            ContentBlock::tool_result("toolu_1", r#"search -> {"q":"rust"}"#)
        );
        assert_eq!(messages[3].text(), "Rust is a language.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);

        let events = drain(&mut event_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolStart { tool_use_id, tool_name, input }
                if tool_use_id == "toolu_1" && tool_name == "search" && input["q"] == "rust"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            AgentEvent::ToolComplete { tool_use_id, result }
                if tool_use_id == "toolu_1" && result.success
        )));
        assert!(matches!(events.last(), Some(AgentEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn tool_failures_become_results_and_loop_continues() {
        let provider = ScriptedProvider::new(vec![
            vec![
                Ok(LLMChunk::ToolUse(ToolUseDelta::start(0, "toolu_a", "broken"))),
                Ok(LLMChunk::ToolUse(ToolUseDelta::start(1, "toolu_b", "missing"))),
                Ok(LLMChunk::Stop(StopReason::ToolUse)),
            ],
            text_response("Both tools failed."),
        ]);
        let tools = Arc::new(EchoTools { names: vec!["broken"] });
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let mut session = Session::new("s3");

        run_agent_loop_with_config(
            &mut session,
            "Try the tools".to_string(),
            event_tx,
            provider,
            tools,
            &default_budgeter(),
            CancellationToken::new(),
            config(10),
        )
        .await
        .unwrap();

        let results = session.messages()[2].blocks().to_vec();
        assert_eq!(results.len(), 2);
        assert_eq!(session.messages()[3].text(), "Both tools failed.");

        let errors: Vec<(String, String)> = drain(&mut event_rx)
            .into_iter()
            .filter_map(|event| match event {
                AgentEvent::ToolError { tool_use_id, error } => Some((tool_use_id, error)),
                _ => None,
            })
            .collect();
        assert_eq!(
            errors,
            vec![
                (
                    "toolu_a".to_string(),
                    "Error executing tool broken: connection closed".to_string()
                ),
                ("toolu_b".to_string(), "Tool missing not found".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn llm_failure_reports_error_and_keeps_session_usable() {
        let provider = ScriptedProvider::new(Vec::new());
        let tools = Arc::new(EchoTools { names: vec![] });
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let mut session = Session::new("s4");

        let error = run_agent_loop_with_config(
            &mut session,
            "Hello?".to_string(),
            event_tx,
            provider,
            tools,
            &default_budgeter(),
            CancellationToken::new(),
            config(10),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, AgentError::LLM(_)));
        assert_eq!(session.len(), 1);
        assert!(drain(&mut event_rx).iter().any(|e| matches!(
            e,
            AgentEvent::Error { message } if message.contains("Overloaded")
        )));

        session
            .add_message(Message::assistant("recovered"))
            .expect("history stays appendable");
    }

    #[tokio::test]
    async fn max_rounds_bounds_tool_loop() {
        let provider = ScriptedProvider::always(tool_response("toolu_1", "search", "{}"));
        let tools = Arc::new(EchoTools { names: vec!["search"] });
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let mut session = Session::new("s5");

        run_agent_loop_with_config(
            &mut session,
            "Loop forever".to_string(),
            event_tx,
            provider.clone(),
            tools,
            &default_budgeter(),
            CancellationToken::new(),
            config(2),
        )
        .await
        .unwrap();

        assert_eq!(provider.requests().len(), 2);
        assert_eq!(session.len(), 5);
        assert!(matches!(
            drain(&mut event_rx).last(),
            Some(AgentEvent::Complete { .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_turn_makes_no_request() {
        let provider = ScriptedProvider::new(vec![text_response("unused")]);
        let tools = Arc::new(EchoTools { names: vec![] });
        let (event_tx, _event_rx) = mpsc::channel(64);
        let cancel_token = CancellationToken::new();
        cancel_token.cancel();
        let mut session = Session::new("s6");

        let error = run_agent_loop_with_config(
            &mut session,
            "Hi".to_string(),
            event_tx,
            provider.clone(),
            tools,
            &default_budgeter(),
            cancel_token,
            config(10),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, AgentError::Cancelled));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn request_carries_only_budgeted_suffix() {
        let provider = ScriptedProvider::new(vec![text_response("ok")]);
        let tools = Arc::new(EchoTools { names: vec![] });
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let budgeter = ContextBudgeter::new(Arc::new(CharCounter { max_usable: 60 }));

        let mut session = Session::new("s7");
        session.add_user_message("a".repeat(50));
        session.add_assistant_message("b".repeat(50));

        run_agent_loop_with_config(
            &mut session,
            "hi".to_string(),
            event_tx,
            provider.clone(),
            tools,
            &budgeter,
            CancellationToken::new(),
            AgentLoopConfig::default(),
        )
        .await
        .unwrap();

        let sent = &provider.requests()[0].messages;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].text(), "hi");
        assert_eq!(session.len(), 4);

        match drain(&mut event_rx).first() {
            Some(AgentEvent::TokenBudgetUpdated { usage }) => {
                assert!(usage.truncation_occurred);
                assert_eq!(usage.messages_removed, 1);
                assert_eq!(usage.window_tokens, 52);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_budget_is_reported_without_request() {
        let provider = ScriptedProvider::new(vec![text_response("unused")]);
        let tools = Arc::new(EchoTools { names: vec![] });
        let (event_tx, _event_rx) = mpsc::channel(64);
        let budgeter = ContextBudgeter::new(Arc::new(CharCounter { max_usable: 10 }));
        let mut session = Session::new("s8");

        let error = run_agent_loop_with_config(
            &mut session,
            "hi".to_string(),
            event_tx,
            provider.clone(),
            tools,
            &budgeter,
            CancellationToken::new(),
            config(10),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(error, AgentError::BudgetExhausted(message) if message.contains("leaving no room"))
        );
        assert!(provider.requests().is_empty());
        assert_eq!(session.len(), 1);
    }

    #[tokio::test]
    async fn oversized_newest_message_is_reported_without_request() {
        let provider = ScriptedProvider::new(vec![text_response("unused")]);
        let tools = Arc::new(EchoTools { names: vec![] });
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let budgeter = ContextBudgeter::new(Arc::new(CharCounter { max_usable: 60 }));
        let mut session = Session::new("s9");

        let error = run_agent_loop_with_config(
            &mut session,
            "x".repeat(100),
            event_tx,
            provider.clone(),
            tools,
            &budgeter,
            CancellationToken::new(),
            config(10),
        )
        .await
        .unwrap_err();

        let expected =
            "the newest message does not fit in the 32 tokens left after the system prompt and 0 tools";
        assert!(matches!(&error, AgentError::BudgetExhausted(message) if message == expected));
        assert!(provider.requests().is_empty());
        assert_eq!(session.len(), 1);

        let events = drain(&mut event_rx);
        assert!(events
            .iter()
            .any(|event| matches!(event, AgentEvent::Error { message } if message == expected)));
    }
}
