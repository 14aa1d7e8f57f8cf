//! MCP (Model Context Protocol) tool catalogue for the chat agent
//!
//! Tracks the tools offered by each connected MCP server and routes the
//! model's tool calls back to the server that owns them.

pub mod catalogue;
pub mod error;
pub mod executor;
pub mod session;
pub mod types;

pub use catalogue::{CatalogueSnapshot, ToolCatalogue};
pub use error::{McpError, Result};
pub use executor::McpToolExecutor;
pub use session::McpSession;
pub use types::*;
