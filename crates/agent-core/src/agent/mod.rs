pub mod error;
pub mod events;
pub mod types;

pub use error::{AgentError, HistoryError};
pub use events::{AgentEvent, TokenBudgetUsage, TokenUsage};
pub use types::{ContentBlock, Message, MessageContent, Role, Session};
