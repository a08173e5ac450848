//! Normalization of a raw pipeline document into ID-indexed entity maps.
//!
//! The raw document arrives in arbitrary order and may repeat ids; the
//! normalizer deduplicates (first occurrence wins), derives canonical edge
//! ids, and produces insertion-ordered maps so the same multiset of input
//! entities always yields a content-identical state.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::graph::{edge_id, Edge, Layer, Node, NodeType, RegisteredPipeline, Tag};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("pipeline document is missing a `{0}` array")]
    MissingCollection(&'static str),
    #[error("malformed pipeline document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Raw pipeline document as supplied by the external fetch collaborator.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct RawDocument {
    #[serde(default)]
    pub nodes: Option<Vec<RawNode>>,
    #[serde(default)]
    pub edges: Option<Vec<RawEdge>>,
    #[serde(default)]
    pub tags: Option<Vec<RawTag>>,
    #[serde(default)]
    pub layers: Option<Vec<String>>,
    #[serde(default)]
    pub pipelines: Option<Vec<RawRegisteredPipeline>>,
    #[serde(default)]
    pub modular_pipelines: Option<IndexMap<String, RawModularPipeline>>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RawNode {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub pipelines: Vec<String>,
    #[serde(default)]
    pub modular_pipelines: Vec<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RawEdge {
    pub source: String,
    pub target: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RawTag {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RawRegisteredPipeline {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RawModularPipeline {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

/// A declared modular-pipeline namespace, as normalized from the raw map.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct NamespaceDecl {
    pub name: String,
    pub children: IndexSet<String>,
}

/// Normalized, deduplicated, ID-indexed pipeline state. Treated as an
/// immutable snapshot by every derivation downstream.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct NormalizedState {
    pub nodes: IndexMap<String, Node>,
    pub edges: IndexMap<String, Edge>,
    pub tags: IndexMap<String, Tag>,
    pub layers: IndexMap<String, Layer>,
    pub pipelines: IndexMap<String, RegisteredPipeline>,
    pub modular_pipelines: IndexMap<String, NamespaceDecl>,
    pub active_pipeline: Option<String>,
}

/// Parse a JSON pipeline document and normalize it in one step.
pub fn parse_document(json: &str) -> Result<NormalizedState, NormalizeError> {
    let doc: RawDocument = serde_json::from_str(json)?;
    normalize(&doc)
}

/// Normalize a raw pipeline document. Fails without partial state when the
/// required `nodes`/`edges` arrays are absent; all other collections are
/// optional and default to empty. The input document is never mutated.
pub fn normalize(doc: &RawDocument) -> Result<NormalizedState, NormalizeError> {
    let raw_nodes = doc
        .nodes
        .as_ref()
        .ok_or(NormalizeError::MissingCollection("nodes"))?;
    let raw_edges = doc
        .edges
        .as_ref()
        .ok_or(NormalizeError::MissingCollection("edges"))?;

    let mut state = NormalizedState::default();

    for raw in doc.tags.iter().flatten() {
        if state.tags.contains_key(&raw.id) {
            debug!("dropping duplicate tag `{}`", raw.id);
            continue;
        }
        let name = raw.name.clone().unwrap_or_else(|| raw.id.clone());
        state.tags.insert(
            raw.id.clone(),
            Tag {
                id: raw.id.clone(),
                name,
                enabled: false,
            },
        );
    }

    for raw in doc.layers.iter().flatten() {
        if state.layers.contains_key(raw) {
            debug!("dropping duplicate layer `{}`", raw);
            continue;
        }
        state.layers.insert(
            raw.clone(),
            Layer {
                id: raw.clone(),
                name: raw.clone(),
            },
        );
    }

    for raw in doc.pipelines.iter().flatten() {
        if state.pipelines.contains_key(&raw.id) {
            debug!("dropping duplicate pipeline `{}`", raw.id);
            continue;
        }
        let name = raw.name.clone().unwrap_or_else(|| raw.id.clone());
        state.pipelines.insert(
            raw.id.clone(),
            RegisteredPipeline {
                id: raw.id.clone(),
                name,
            },
        );
    }
    state.active_pipeline = state.pipelines.keys().next().cloned();

    for (id, raw) in doc.modular_pipelines.iter().flatten() {
        let name = raw
            .name
            .clone()
            .unwrap_or_else(|| trailing_segment(id).to_string());
        state.modular_pipelines.insert(
            id.clone(),
            NamespaceDecl {
                name,
                children: raw.children.iter().cloned().collect(),
            },
        );
    }

    for raw in raw_nodes {
        if state.nodes.contains_key(&raw.id) {
            debug!("dropping duplicate node `{}`", raw.id);
            continue;
        }
        let name = raw.name.clone().unwrap_or_else(|| raw.id.clone());
        let full_name = raw.full_name.clone().unwrap_or_else(|| name.clone());
        let node = Node {
            id: raw.id.clone(),
            name,
            full_name,
            node_type: raw.node_type,
            tags: raw.tags.iter().cloned().collect(),
            layer: raw.layer.clone(),
            pipelines: raw.pipelines.iter().cloned().collect(),
            namespace_chain: namespace_chain(&raw.modular_pipelines),
        };
        register_node_references(&mut state, &node);
        state.nodes.insert(raw.id.clone(), node);
    }

    for raw in raw_edges {
        if !state.nodes.contains_key(&raw.source) || !state.nodes.contains_key(&raw.target) {
            warn!(
                "dropping edge `{}` -> `{}`: endpoint not registered",
                raw.source, raw.target
            );
            continue;
        }
        let id = edge_id(&raw.source, &raw.target);
        if state.edges.contains_key(&id) {
            continue;
        }
        state.edges.insert(id, Edge::new(&raw.source, &raw.target));
    }

    debug!("normalized document: {}", state.stats());
    Ok(state)
}

/// Tags, layers and pipelines referenced by a node but never declared are
/// registered on first sight, named after their id.
fn register_node_references(state: &mut NormalizedState, node: &Node) {
    for tag in &node.tags {
        state.tags.entry(tag.clone()).or_insert_with(|| Tag {
            id: tag.clone(),
            name: tag.clone(),
            enabled: false,
        });
    }
    if let Some(layer) = &node.layer {
        state.layers.entry(layer.clone()).or_insert_with(|| Layer {
            id: layer.clone(),
            name: layer.clone(),
        });
    }
    for pipeline in &node.pipelines {
        state
            .pipelines
            .entry(pipeline.clone())
            .or_insert_with(|| RegisteredPipeline {
                id: pipeline.clone(),
                name: pipeline.clone(),
            });
    }
}

/// Expand every declared namespace id into its dotted-prefix ancestors and
/// order the union outermost first. `["uk.data"]` becomes
/// `["uk", "uk.data"]`.
fn namespace_chain(declared: &[String]) -> Vec<String> {
    let mut ancestors: IndexSet<String> = IndexSet::new();
    for id in declared {
        if id.is_empty() {
            continue;
        }
        let mut prefix = String::new();
        for segment in id.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            ancestors.insert(prefix.clone());
        }
    }
    let mut chain: Vec<String> = ancestors.into_iter().collect();
    chain.sort_by(|a, b| {
        let depth_a = a.split('.').count();
        let depth_b = b.split('.').count();
        depth_a.cmp(&depth_b).then_with(|| a.cmp(b))
    });
    chain
}

fn trailing_segment(id: &str) -> &str {
    id.rsplit('.').next().unwrap_or(id)
}

impl NormalizedState {
    /// Display name for a namespace id: the declared name when the
    /// namespace was declared, the trailing path segment otherwise.
    pub fn namespace_name(&self, id: &str) -> String {
        self.modular_pipelines
            .get(id)
            .map(|decl| decl.name.clone())
            .unwrap_or_else(|| trailing_segment(id).to_string())
    }

    /// Node ids belonging to a registered pipeline.
    pub fn nodes_in_pipeline(&self, pipeline: &str) -> IndexSet<String> {
        self.nodes
            .values()
            .filter(|n| n.pipelines.contains(pipeline))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Referential problems that normalization tolerates: dangling edge
    /// endpoints on hand-built states, layer/tag references without an
    /// entry, namespace children that name nothing. Reported, not fatal.
    pub fn integrity_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for edge in self.edges.values() {
            if !self.nodes.contains_key(&edge.source) {
                errors.push(format!(
                    "edge [{}] source `{}` not found in nodes",
                    edge.id, edge.source
                ));
            }
            if !self.nodes.contains_key(&edge.target) {
                errors.push(format!(
                    "edge [{}] target `{}` not found in nodes",
                    edge.id, edge.target
                ));
            }
        }
        for node in self.nodes.values() {
            if let Some(layer) = &node.layer {
                if !self.layers.contains_key(layer) {
                    errors.push(format!(
                        "node [{}] layer `{}` not found in layers",
                        node.id, layer
                    ));
                }
            }
            for tag in &node.tags {
                if !self.tags.contains_key(tag) {
                    errors.push(format!("node [{}] tag `{}` not found in tags", node.id, tag));
                }
            }
        }
        for (id, decl) in &self.modular_pipelines {
            for child in &decl.children {
                if !self.nodes.contains_key(child) && !self.modular_pipelines.contains_key(child) {
                    errors.push(format!(
                        "modular pipeline `{}` child `{}` is neither a node nor a namespace",
                        id, child
                    ));
                }
            }
        }
        errors
    }

    pub fn stats(&self) -> String {
        format!(
            "Nodes: {}, Edges: {}, Tags: {}, Layers: {}, Pipelines: {}, Modular pipelines: {}",
            self.nodes.len(),
            self.edges.len(),
            self.tags.len(),
            self.layers.len(),
            self.pipelines.len(),
            self.modular_pipelines.len()
        )
    }
}
