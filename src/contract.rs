//! Contraction of collapsed namespaces into synthetic super-nodes.
//!
//! Every node resolves to an effective id (itself, or its outermost
//! collapsed ancestor); edges are re-keyed over effective ids, internal
//! edges vanish and crossing edges deduplicate. Merging only along
//! ancestor chains cannot introduce a back-edge, so an acyclic input stays
//! acyclic.

use std::collections::{HashMap, VecDeque};

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::debug;

use crate::graph::{edge_id, Edge, Node, NodeType};
use crate::normalize::NormalizedState;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ContractedNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ContractedGraph {
    pub nodes: IndexMap<String, ContractedNode>,
    pub edges: IndexMap<String, Edge>,
}

impl ContractedGraph {
    /// Kahn's algorithm over the contracted edge set. `Err` when a cycle
    /// prevents a complete ordering.
    pub fn topological_sort(&self) -> Result<Vec<String>, String> {
        kahn_sort(
            self.nodes.keys().map(String::as_str),
            self.edges
                .values()
                .map(|e| (e.source.as_str(), e.target.as_str())),
        )
    }
}

/// The id a node renders as under the given collapse set: the outermost
/// collapsed ancestor when one exists, the node's own id otherwise. The
/// chain is ordered outermost first, so the first hit wins even when a
/// collapsed namespace nests inside another collapsed one.
pub fn effective_id<'a>(node: &'a Node, collapsed: &IndexSet<String>) -> &'a str {
    node.namespace_chain
        .iter()
        .find(|ancestor| collapsed.contains(ancestor.as_str()))
        .map(String::as_str)
        .unwrap_or(&node.id)
}

/// Produce the reduced graph for a set of collapsed namespace ids.
pub fn contract(state: &NormalizedState, collapsed: &IndexSet<String>) -> ContractedGraph {
    let mut graph = ContractedGraph::default();

    for (id, node) in &state.nodes {
        let eff = effective_id(node, collapsed);
        if eff == id {
            graph.nodes.entry(id.clone()).or_insert_with(|| ContractedNode {
                id: id.clone(),
                name: node.name.clone(),
                node_type: node.node_type,
            });
        } else {
            graph
                .nodes
                .entry(eff.to_string())
                .or_insert_with(|| ContractedNode {
                    id: eff.to_string(),
                    name: state.namespace_name(eff),
                    node_type: NodeType::ModularPipeline,
                });
        }
    }

    for edge in state.edges.values() {
        let (Some(source), Some(target)) =
            (state.nodes.get(&edge.source), state.nodes.get(&edge.target))
        else {
            continue;
        };
        let eff_u = effective_id(source, collapsed);
        let eff_v = effective_id(target, collapsed);
        if eff_u == eff_v {
            continue;
        }
        let id = edge_id(eff_u, eff_v);
        graph
            .edges
            .entry(id)
            .or_insert_with(|| Edge::new(eff_u, eff_v));
    }

    debug!(
        "contracted {} nodes / {} edges down to {} / {}",
        state.nodes.len(),
        state.edges.len(),
        graph.nodes.len(),
        graph.edges.len()
    );

    if cfg!(debug_assertions) {
        let original_acyclic = kahn_sort(
            state.nodes.keys().map(String::as_str),
            state
                .edges
                .values()
                .map(|e| (e.source.as_str(), e.target.as_str())),
        )
        .is_ok();
        assert!(
            !original_acyclic || graph.topological_sort().is_ok(),
            "contraction produced a cycle from an acyclic graph"
        );
    }

    graph
}

/// Kahn topological sort over borrowed ids. Links whose endpoints are not
/// in the id set are ignored.
fn kahn_sort<'a>(
    ids: impl Iterator<Item = &'a str>,
    links: impl Iterator<Item = (&'a str, &'a str)>,
) -> Result<Vec<String>, String> {
    let mut in_degree: HashMap<&str, usize> = ids.map(|id| (id, 0)).collect();
    let mut adj_list: HashMap<&str, Vec<&str>> = HashMap::new();

    for (source, target) in links {
        if !in_degree.contains_key(source) || !in_degree.contains_key(target) {
            continue;
        }
        adj_list.entry(source).or_default().push(target);
        if let Some(degree) = in_degree.get_mut(target) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();
    let total = in_degree.len();
    let mut result = Vec::with_capacity(total);

    while let Some(id) = queue.pop_front() {
        result.push(id.to_string());
        if let Some(neighbors) = adj_list.get(id) {
            for &neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor);
                    }
                }
            }
        }
    }

    if result.len() != total {
        Err("graph contains a cycle".to_string())
    } else {
        Ok(result)
    }
}
