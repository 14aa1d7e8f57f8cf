use std::path::Path;

use chrono::NaiveDate;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant with access to various tools through the Model Context Protocol (MCP).
You can use these tools to help users accomplish their tasks. When using tools:
1. Explain what you're doing before using a tool
2. Use the most appropriate tool for the task
3. Handle tool results appropriately
4. Continue the conversation naturally after tool use";

pub fn default_system_prompt(today: NaiveDate) -> String {
    format!("{}\n\nToday's date is {}.", SYSTEM_PROMPT, today.format("%Y-%m-%d"))
}

/// Reads the prompt file when one is given, otherwise the built-in prompt.
pub fn load_system_prompt(path: Option<&Path>, today: NaiveDate) -> anyhow::Result<String> {
    match path {
        Some(path) => {
            let prompt = std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("failed to read system prompt {}: {}", path.display(), e)
            })?;
            Ok(prompt.trim_end().to_string())
        }
        None => Ok(default_system_prompt(today)),
    }
}
