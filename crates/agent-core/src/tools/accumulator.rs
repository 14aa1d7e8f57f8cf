use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::tools::ToolUse;

/// One streamed fragment of a tool use, keyed by its content block index.
///
/// The first fragment of a block carries the id and name; later fragments only
/// carry pieces of the JSON input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUseDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub partial_json: String,
}

impl ToolUseDelta {
    pub fn start(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            partial_json: String::new(),
        }
    }

    pub fn input(index: usize, partial_json: impl Into<String>) -> Self {
        Self {
            index,
            id: None,
            name: None,
            partial_json: partial_json.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PartialToolUse {
    id: Option<String>,
    name: Option<String>,
    input_json: String,
}

/// Merges streamed tool-use fragments into complete [`ToolUse`] blocks.
#[derive(Debug, Default, Clone)]
pub struct ToolUseAccumulator {
    parts: BTreeMap<usize, PartialToolUse>,
}

impl ToolUseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, delta: ToolUseDelta) {
        let entry = self.parts.entry(delta.index).or_default();

        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            entry.id = Some(id);
        }
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            entry.name = Some(name);
        }
        entry.input_json.push_str(&delta.partial_json);
    }

    pub fn extend<I>(&mut self, deltas: I)
    where
        I: IntoIterator<Item = ToolUseDelta>,
    {
        for delta in deltas {
            self.update(delta);
        }
    }

    /// Complete tool uses in block order. Fragments that never received a name
    /// are dropped; an empty input becomes `{}`.
    pub fn finalize(self) -> Vec<ToolUse> {
        self.parts
            .into_values()
            .filter_map(|part| {
                let name = part.name?;
                let input = parse_input(&name, &part.input_json);
                Some(ToolUse {
                    id: part.id.unwrap_or_else(|| format!("toolu_{}", Uuid::new_v4().simple())),
                    name,
                    input,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

fn parse_input(name: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Invalid JSON input for tool {}: {}", name, e);
            Value::Object(Default::default())
        }
    }
}
