//! Process-wide node type catalog (spec §4.7).

use crate::node::NodeKind;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// A node's declared input/output ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ports {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

/// How a tool-classified node type is invoked by the compiler (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    FunctionCall,
    Standalone,
}

impl ToolMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FunctionCall => "function_call",
            Self::Standalone => "standalone",
        }
    }
}

/// One catalog entry (spec §4.7, wire shape in §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeDefinition {
    #[serde(rename = "type")]
    pub type_name: String,
    pub category: String,
    pub display_name: String,
    pub description: String,
    pub ports: Ports,
    pub config_schema: serde_json::Value,
    pub is_tool: bool,
    pub tool_mode: Option<ToolMode>,
}

impl NodeTypeDefinition {
    #[must_use]
    pub fn builtin(kind: NodeKind) -> Self {
        Self {
            type_name: kind.as_str().to_string(),
            category: "builtin".to_string(),
            display_name: capitalize(kind.as_str()),
            description: format!("Builtin {} node", kind.as_str()),
            ports: Ports::default(),
            config_schema: serde_json::json!({}),
            is_tool: matches!(kind, NodeKind::Tool),
            tool_mode: None,
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Thread-safe, process-wide catalog of node type definitions. Readers
/// query by name, "is tool?", and "tool mode?"; a daemon-level layer (out
/// of this crate's scope) is expected to synchronize tool-provided types in
/// via `register`/`unregister`.
pub struct NodeTypeRegistry {
    entries: RwLock<Vec<NodeTypeDefinition>>,
}

impl Default for NodeTypeRegistry {
    /// Seeded with the 15 builtin node kinds (SPEC_FULL.md EXPANSION item 3).
    fn default() -> Self {
        let entries = NodeKind::ALL.into_iter().map(NodeTypeDefinition::builtin).collect();
        Self {
            entries: RwLock::new(entries),
        }
    }
}

impl NodeTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, definition: NodeTypeDefinition) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|e| e.type_name != definition.type_name);
        entries.push(definition);
    }

    pub fn unregister(&self, type_name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|e| e.type_name != type_name);
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<NodeTypeDefinition> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().find(|e| e.type_name == type_name).cloned()
    }

    #[must_use]
    pub fn is_tool(&self, type_name: &str) -> bool {
        self.get(type_name).is_some_and(|e| e.is_tool)
    }

    #[must_use]
    pub fn tool_mode(&self, type_name: &str) -> Option<ToolMode> {
        self.get(type_name).and_then(|e| e.tool_mode)
    }

    /// Snapshot the full catalog in the exact wire shape (spec §6
    /// "Tool-registry snapshot shape").
    #[must_use]
    pub fn to_wire(&self) -> Vec<NodeTypeDefinition> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.clone()
    }
}
