use agent_core::budget::limits::DEFAULT_MAX_OUTPUT_TOKENS;

/// Configuration for the agent loop.
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    /// Upper bound on LLM calls per user turn
    pub max_rounds: usize,
    /// System instructions sent alongside every request
    pub system_prompt: String,
    /// Response allowance reserved on every request
    pub max_output_tokens: u32,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: 50,
            system_prompt: String::new(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}
