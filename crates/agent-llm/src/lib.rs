pub mod provider;
pub mod providers;
pub mod types;

pub use provider::{LLMError, LLMProvider, LLMStream};
pub use providers::AnthropicProvider;
pub use types::{LLMChunk, StopReason};
