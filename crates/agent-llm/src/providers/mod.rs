//! LLM Providers

pub(crate) mod common;
pub mod anthropic;

pub use anthropic::AnthropicProvider;
