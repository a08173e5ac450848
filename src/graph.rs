use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Kind of a graph entity. Every consumer matches exhaustively on this;
/// synthetic super-nodes produced by contraction carry `ModularPipeline`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Task,
    Data,
    Parameters,
    ModularPipeline,
}

impl NodeType {
    pub fn all() -> [NodeType; 4] {
        [
            NodeType::Task,
            NodeType::Data,
            NodeType::Parameters,
            NodeType::ModularPipeline,
        ]
    }
}

/// A task or dataset in the pipeline graph. Created once during
/// normalization and immutable afterwards; derived flags (disabled,
/// visible) live in separate maps, never on the node itself.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub full_name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub tags: IndexSet<String>,
    pub layer: Option<String>,
    pub pipelines: IndexSet<String>,
    /// Ancestor namespace ids, outermost first.
    pub namespace_chain: Vec<String>,
}

impl Node {
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace_chain.iter().any(|a| a == namespace)
    }

    /// Innermost namespace the node belongs to, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace_chain.last().map(String::as_str)
    }
}

/// Canonical edge id. A pure function of the endpoint ids, so the same
/// (source, target) pair always maps to the same edge entry.
pub fn edge_id(source: &str, target: &str) -> String {
    [source, target].join("|")
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            id: edge_id(source, target),
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: String,
    pub name: String,
}

/// A registered pipeline the node set can be sliced by. Which one is
/// active lives on the normalized state, not here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RegisteredPipeline {
    pub id: String,
    pub name: String,
}
