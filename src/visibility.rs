//! Per-node/edge disabled flags derived from the composable filters: node
//! types, tags, and single-namespace focus. Pure over the normalized
//! snapshot; recomputed per filter-state change.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::graph::NodeType;
use crate::normalize::NormalizedState;

/// The independently-toggleable filters. Focus tightens the other two,
/// never loosens them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    pub disabled_types: IndexSet<NodeType>,
    pub enabled_tags: IndexSet<String>,
    /// Namespace id to narrow the view to, plus its direct boundary nodes.
    pub focus: Option<String>,
}

impl FilterState {
    /// The tag filter participates once at least one tag is enabled.
    pub fn tag_filter_active(&self) -> bool {
        !self.enabled_tags.is_empty()
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct DisabledFlags {
    pub nodes: IndexMap<String, bool>,
    pub edges: IndexMap<String, bool>,
}

/// External nodes feeding into (`inputs`) and fed by (`outputs`) a focused
/// namespace, judged against the uncontracted edge set.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct FocusBoundary {
    pub inputs: IndexSet<String>,
    pub outputs: IndexSet<String>,
}

pub fn focus_boundary(state: &NormalizedState, namespace: &str) -> FocusBoundary {
    let inside: HashSet<&str> = state
        .nodes
        .values()
        .filter(|n| n.in_namespace(namespace))
        .map(|n| n.id.as_str())
        .collect();

    let mut boundary = FocusBoundary::default();
    for edge in state.edges.values() {
        let source_in = inside.contains(edge.source.as_str());
        let target_in = inside.contains(edge.target.as_str());
        if !source_in && target_in {
            boundary.inputs.insert(edge.source.clone());
        } else if source_in && !target_in {
            boundary.outputs.insert(edge.target.clone());
        }
    }
    boundary
}

/// Resolve the disabled flag of every node and edge.
///
/// A node is disabled if any filter excludes it: its type is switched off,
/// an active tag filter misses its tag set (a node without tags matches no
/// enabled tag), or a focused namespace neither contains it nor lists it as
/// a direct boundary node. An edge is disabled exactly when either endpoint
/// is.
pub fn resolve_disabled(state: &NormalizedState, filters: &FilterState) -> DisabledFlags {
    let focus_scope = filters
        .focus
        .as_deref()
        .map(|namespace| focus_scope(state, namespace));

    let mut flags = DisabledFlags::default();
    for (id, node) in &state.nodes {
        let type_disabled = filters.disabled_types.contains(&node.node_type);
        let tag_disabled = filters.tag_filter_active()
            && !node.tags.iter().any(|t| filters.enabled_tags.contains(t));
        let focus_disabled = focus_scope
            .as_ref()
            .map(|scope| !scope.contains(id.as_str()))
            .unwrap_or(false);
        flags
            .nodes
            .insert(id.clone(), type_disabled || tag_disabled || focus_disabled);
    }

    for (id, edge) in &state.edges {
        let disabled = flags.nodes.get(&edge.source).copied().unwrap_or(true)
            || flags.nodes.get(&edge.target).copied().unwrap_or(true);
        flags.edges.insert(id.clone(), disabled);
    }
    flags
}

/// Ids focus mode keeps: the namespace subtree plus its direct external
/// boundary. Membership is judged against the subtree only, so boundary
/// nodes never pull in their own neighbors.
fn focus_scope(state: &NormalizedState, namespace: &str) -> HashSet<String> {
    let boundary = focus_boundary(state, namespace);
    let mut scope: HashSet<String> = state
        .nodes
        .values()
        .filter(|n| n.in_namespace(namespace))
        .map(|n| n.id.clone())
        .collect();
    scope.extend(boundary.inputs.into_iter());
    scope.extend(boundary.outputs.into_iter());
    scope
}
