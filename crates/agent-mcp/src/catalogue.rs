//! Per-session tool catalogue built from the connected MCP servers.
//!
//! The catalogue is republished as a whole on every connect and disconnect.
//! Readers hold an `Arc` to an immutable snapshot, so a turn that already
//! took a snapshot never sees a half-updated tool list.

use std::collections::HashMap;
use std::sync::Arc;

use agent_core::ToolDescriptor;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::session::McpSession;
use crate::types::McpTool;

/// Immutable view of the flattened tool catalogue.
#[derive(Debug, Clone, Default)]
pub struct CatalogueSnapshot {
    tools: Vec<ToolDescriptor>,
    /// tool name -> owning connection name
    owners: HashMap<String, String>,
    version: u64,
}

impl CatalogueSnapshot {
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn owner_of(&self, tool_name: &str) -> Option<&str> {
        self.owners.get(tool_name).map(String::as_str)
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.owners.contains_key(tool_name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Increases by one on every publish.
    pub fn version(&self) -> u64 {
        self.version
    }
}

struct Connection {
    name: String,
    tools: Vec<McpTool>,
}

#[derive(Default)]
struct Connections {
    /// In connect order; earlier connections win name clashes
    ordered: Vec<Connection>,
    sessions: HashMap<String, Arc<dyn McpSession>>,
}

/// Tool catalogue for one chat session.
pub struct ToolCatalogue {
    connections: Mutex<Connections>,
    published: RwLock<Arc<CatalogueSnapshot>>,
}

impl ToolCatalogue {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Connections::default()),
            published: RwLock::new(Arc::new(CatalogueSnapshot::default())),
        }
    }

    /// Lists the connection's tools and publishes a catalogue that includes them.
    ///
    /// Reconnecting under an existing name replaces the earlier connection.
    /// Returns the number of tools the server listed.
    pub async fn connect(&self, name: &str, session: Arc<dyn McpSession>) -> Result<usize> {
        let tools = session.list_tools().await.map_err(|e| {
            warn!("Error connecting to MCP {}: {}", name, e);
            e
        })?;
        let count = tools.len();

        info!("Connected to MCP: {}", name);
        debug!(
            "Available tools from {}: {:?}",
            name,
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        let mut connections = self.connections.lock();
        connections.ordered.retain(|c| c.name != name);
        connections.ordered.push(Connection {
            name: name.to_string(),
            tools,
        });
        connections.sessions.insert(name.to_string(), session);
        self.publish(&connections);

        Ok(count)
    }

    /// Drops a connection and publishes a catalogue without its tools.
    ///
    /// Returns false when no connection had that name.
    pub fn disconnect(&self, name: &str) -> bool {
        let mut connections = self.connections.lock();
        let before = connections.ordered.len();
        connections.ordered.retain(|c| c.name != name);
        connections.sessions.remove(name);

        if connections.ordered.len() == before {
            debug!("Disconnect for unknown MCP connection {}", name);
            return false;
        }

        info!("Disconnected from MCP: {}", name);
        self.publish(&connections);
        true
    }

    /// Current published catalogue.
    pub fn snapshot(&self) -> Arc<CatalogueSnapshot> {
        self.published.read().clone()
    }

    /// Live session for a connection, if it is still connected.
    pub fn session(&self, connection: &str) -> Option<Arc<dyn McpSession>> {
        self.connections.lock().sessions.get(connection).cloned()
    }

    pub fn connection_names(&self) -> Vec<String> {
        self.connections
            .lock()
            .ordered
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    fn publish(&self, connections: &Connections) {
        let version = self.published.read().version + 1;
        let snapshot = build_snapshot(&connections.ordered, version);
        debug!(
            "Publishing tool catalogue v{} with {} tools",
            snapshot.version,
            snapshot.tools.len()
        );
        *self.published.write() = Arc::new(snapshot);
    }
}

impl Default for ToolCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

fn build_snapshot(connections: &[Connection], version: u64) -> CatalogueSnapshot {
    let mut tools = Vec::new();
    let mut owners = HashMap::new();

    for connection in connections {
        for tool in &connection.tools {
            if let Some(owner) = owners.get(&tool.name) {
                warn!(
                    "Tool {} from MCP {} shadowed by MCP {}, skipping",
                    tool.name, connection.name, owner
                );
                continue;
            }
            owners.insert(tool.name.clone(), connection.name.clone());
            tools.push(ToolDescriptor::from(tool));
        }
    }

    CatalogueSnapshot {
        tools,
        owners,
        version,
    }
}
