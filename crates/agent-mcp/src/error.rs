use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McpError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection closed")]
    Disconnected,
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        McpError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, McpError>;
