//! Modular-pipeline tree: the namespace hierarchy with expand/collapse and
//! visibility state. Built from the normalized state; every node is
//! registered under every ancestor of its dotted namespace chain, so the
//! contraction engine and the incremental-reveal UI share one structure.

use std::collections::{HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::normalize::NormalizedState;

/// Reserved id of the synthetic forest root.
pub const ROOT_PIPELINE_ID: &str = "__root__";

#[derive(Debug, Error, PartialEq)]
#[error("modular pipeline namespace `{id}` is part of a cycle in its declared children")]
pub struct NamespaceCycleError {
    pub id: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ModularPipelineNode {
    pub id: String,
    pub name: String,
    /// Direct sub-namespace ids.
    pub children: IndexSet<String>,
    /// Graph-node ids registered at this level.
    pub nodes: IndexSet<String>,
    pub expanded: bool,
    pub visible: bool,
}

impl ModularPipelineNode {
    fn new(id: &str, name: String) -> Self {
        Self {
            id: id.to_string(),
            name,
            children: IndexSet::new(),
            nodes: IndexSet::new(),
            expanded: false,
            visible: false,
        }
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct ModularPipelineTree {
    entries: IndexMap<String, ModularPipelineNode>,
    /// Graph node id -> innermost owning namespace (root for chainless nodes).
    node_owner: IndexMap<String, String>,
    node_visible: IndexMap<String, bool>,
}

impl ModularPipelineTree {
    /// Build the tree for a normalized state.
    ///
    /// With `expand_all` every namespace starts expanded and every member
    /// node visible; otherwise only the root's direct children are visible
    /// and deeper levels are revealed through [`set_expanded`].
    ///
    /// [`set_expanded`]: ModularPipelineTree::set_expanded
    pub fn build(
        state: &NormalizedState,
        expand_all: bool,
    ) -> Result<Self, NamespaceCycleError> {
        let mut tree = Self::default();
        tree.entries.insert(
            ROOT_PIPELINE_ID.to_string(),
            ModularPipelineNode::new(ROOT_PIPELINE_ID, "root".to_string()),
        );

        for id in state.modular_pipelines.keys() {
            tree.ensure_chain(state, id);
        }

        // Declared children may link namespaces outside the dotted-prefix
        // structure; attach them before the cycle check.
        for (id, decl) in &state.modular_pipelines {
            for child in &decl.children {
                if state.modular_pipelines.contains_key(child) {
                    tree.ensure_chain(state, child);
                    if let Some(entry) = tree.entries.get_mut(id) {
                        entry.children.insert(child.clone());
                    }
                } else if state.nodes.contains_key(child) {
                    if let Some(entry) = tree.entries.get_mut(id) {
                        entry.nodes.insert(child.clone());
                    }
                } else {
                    debug!("namespace `{}` child `{}` is not registered", id, child);
                }
            }
        }

        tree.check_cycles()?;

        for node in state.nodes.values() {
            if node.namespace_chain.is_empty() {
                if let Some(root) = tree.entries.get_mut(ROOT_PIPELINE_ID) {
                    root.nodes.insert(node.id.clone());
                }
                tree.node_owner
                    .insert(node.id.clone(), ROOT_PIPELINE_ID.to_string());
                continue;
            }
            for ancestor in &node.namespace_chain {
                tree.ensure_chain(state, ancestor);
                if let Some(entry) = tree.entries.get_mut(ancestor) {
                    entry.nodes.insert(node.id.clone());
                }
            }
            if let Some(innermost) = node.namespace() {
                tree.node_owner
                    .insert(node.id.clone(), innermost.to_string());
            }
        }

        for (id, entry) in tree.entries.iter_mut() {
            entry.expanded = expand_all || id == ROOT_PIPELINE_ID;
        }
        tree.recompute_visibility();
        debug!(
            "built modular pipeline tree with {} namespaces",
            tree.entries.len() - 1
        );
        Ok(tree)
    }

    /// Create entries for every dotted prefix of `id`, linking each to its
    /// parent (the root for top-level namespaces).
    fn ensure_chain(&mut self, state: &NormalizedState, id: &str) {
        let mut parent = ROOT_PIPELINE_ID.to_string();
        let mut prefix = String::new();
        for segment in id.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            if !self.entries.contains_key(&prefix) {
                let name = state.namespace_name(&prefix);
                self.entries
                    .insert(prefix.clone(), ModularPipelineNode::new(&prefix, name));
            }
            if let Some(entry) = self.entries.get_mut(&parent) {
                entry.children.insert(prefix.clone());
            }
            parent = prefix.clone();
        }
    }

    /// Depth-first cycle guard over the namespace links: a namespace seen
    /// again on the current recursion path aborts construction.
    fn check_cycles(&self) -> Result<(), NamespaceCycleError> {
        let mut done: HashSet<String> = HashSet::new();
        for id in self.entries.keys() {
            if !done.contains(id) {
                let mut path: IndexSet<String> = IndexSet::new();
                self.visit(id, &mut path, &mut done)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        id: &str,
        path: &mut IndexSet<String>,
        done: &mut HashSet<String>,
    ) -> Result<(), NamespaceCycleError> {
        if path.contains(id) {
            return Err(NamespaceCycleError { id: id.to_string() });
        }
        if done.contains(id) {
            return Ok(());
        }
        path.insert(id.to_string());
        if let Some(entry) = self.entries.get(id) {
            for child in &entry.children {
                self.visit(child, path, done)?;
            }
        }
        path.shift_remove(id);
        done.insert(id.to_string());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ModularPipelineNode> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> &IndexMap<String, ModularPipelineNode> {
        &self.entries
    }

    pub fn is_node_visible(&self, node_id: &str) -> bool {
        self.node_visible.get(node_id).copied().unwrap_or(false)
    }

    /// Namespaces currently collapsed, i.e. the set the contraction engine
    /// folds into synthetic super-nodes. The root never collapses.
    pub fn collapsed_ids(&self) -> IndexSet<String> {
        self.entries
            .iter()
            .filter(|(id, entry)| *id != ROOT_PIPELINE_ID && !entry.expanded)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn set_expanded(&mut self, id: &str, expanded: bool) {
        if id == ROOT_PIPELINE_ID {
            debug!("ignoring expand/collapse of the root pipeline");
            return;
        }
        match self.entries.get_mut(id) {
            Some(entry) => entry.expanded = expanded,
            None => {
                debug!("ignoring expand/collapse of unknown namespace `{}`", id);
                return;
            }
        }
        self.recompute_visibility();
    }

    pub fn toggle_expanded(&mut self, id: &str) {
        let expanded = self.entries.get(id).map(|e| e.expanded).unwrap_or(false);
        self.set_expanded(id, !expanded);
    }

    pub fn expand_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.expanded = true;
        }
        self.recompute_visibility();
    }

    pub fn collapse_all(&mut self) {
        for (id, entry) in self.entries.iter_mut() {
            entry.expanded = id == ROOT_PIPELINE_ID;
        }
        self.recompute_visibility();
    }

    /// An entry is visible iff every ancestor below the root is expanded; a
    /// member node additionally needs its innermost namespace expanded.
    fn recompute_visibility(&mut self) {
        for entry in self.entries.values_mut() {
            entry.visible = false;
        }
        if let Some(root) = self.entries.get_mut(ROOT_PIPELINE_ID) {
            root.visible = true;
        }

        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(ROOT_PIPELINE_ID.to_string());
        while let Some(id) = queue.pop_front() {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            if !(entry.visible && entry.expanded) {
                continue;
            }
            let children: Vec<String> = entry.children.iter().cloned().collect();
            for child_id in children {
                if let Some(child) = self.entries.get_mut(&child_id) {
                    if !child.visible {
                        child.visible = true;
                        queue.push_back(child_id);
                    }
                }
            }
        }

        self.node_visible.clear();
        for (node_id, owner) in &self.node_owner {
            let shown = self
                .entries
                .get(owner)
                .map(|e| e.visible && e.expanded)
                .unwrap_or(false);
            self.node_visible.insert(node_id.clone(), shown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeType;
    use crate::normalize::{normalize, RawDocument, RawEdge, RawModularPipeline, RawNode};
    use indexmap::IndexMap;

    fn raw_node(id: &str, namespaces: &[&str]) -> RawNode {
        RawNode {
            id: id.to_string(),
            name: None,
            full_name: None,
            node_type: NodeType::Task,
            tags: vec![],
            layer: None,
            pipelines: vec![],
            modular_pipelines: namespaces.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn create_test_state() -> NormalizedState {
        let doc = RawDocument {
            nodes: Some(vec![
                raw_node("ingest", &[]),
                raw_node("clean", &["uk.data"]),
                raw_node("train", &["uk.model"]),
            ]),
            edges: Some(vec![
                RawEdge {
                    source: "ingest".to_string(),
                    target: "clean".to_string(),
                },
                RawEdge {
                    source: "clean".to_string(),
                    target: "train".to_string(),
                },
            ]),
            ..RawDocument::default()
        };
        normalize(&doc).unwrap()
    }

    #[test]
    fn node_is_registered_under_every_ancestor() {
        let tree = ModularPipelineTree::build(&create_test_state(), false).unwrap();
        assert!(tree.get("uk").unwrap().nodes.contains("clean"));
        assert!(tree.get("uk.data").unwrap().nodes.contains("clean"));
        assert!(tree.get("uk").unwrap().children.contains("uk.data"));
        assert!(tree
            .get(ROOT_PIPELINE_ID)
            .unwrap()
            .children
            .contains("uk"));
    }

    #[test]
    fn default_build_reveals_only_root_children() {
        let tree = ModularPipelineTree::build(&create_test_state(), false).unwrap();
        assert!(tree.get("uk").unwrap().visible);
        assert!(!tree.get("uk").unwrap().expanded);
        assert!(!tree.get("uk.data").unwrap().visible);
        assert!(tree.is_node_visible("ingest"));
        assert!(!tree.is_node_visible("clean"));
    }

    #[test]
    fn expand_all_reveals_everything() {
        let tree = ModularPipelineTree::build(&create_test_state(), true).unwrap();
        for entry in tree.entries().values() {
            assert!(entry.expanded, "{} not expanded", entry.id);
            assert!(entry.visible, "{} not visible", entry.id);
        }
        assert!(tree.is_node_visible("ingest"));
        assert!(tree.is_node_visible("clean"));
        assert!(tree.is_node_visible("train"));
    }

    #[test]
    fn incremental_reveal_follows_expansion() {
        let mut tree = ModularPipelineTree::build(&create_test_state(), false).unwrap();
        tree.set_expanded("uk", true);
        assert!(tree.get("uk.data").unwrap().visible);
        assert!(!tree.is_node_visible("clean"));

        tree.set_expanded("uk.data", true);
        assert!(tree.is_node_visible("clean"));

        tree.set_expanded("uk", false);
        assert!(!tree.get("uk.data").unwrap().visible);
        assert!(!tree.is_node_visible("clean"));

        // `uk.data` stayed expanded, so toggling `uk` back reveals both.
        tree.toggle_expanded("uk");
        assert!(tree.get("uk.data").unwrap().visible);
        assert!(tree.is_node_visible("clean"));
    }

    #[test]
    fn collapsed_ids_exclude_root_and_expanded() {
        let mut tree = ModularPipelineTree::build(&create_test_state(), false).unwrap();
        let collapsed = tree.collapsed_ids();
        assert!(collapsed.contains("uk"));
        assert!(collapsed.contains("uk.data"));
        assert!(!collapsed.contains(ROOT_PIPELINE_ID));

        tree.expand_all();
        assert!(tree.collapsed_ids().is_empty());

        tree.collapse_all();
        assert_eq!(tree.collapsed_ids().len(), tree.entries().len() - 1);
    }

    #[test]
    fn root_never_collapses() {
        let mut tree = ModularPipelineTree::build(&create_test_state(), false).unwrap();
        tree.set_expanded(ROOT_PIPELINE_ID, false);
        assert!(tree.get(ROOT_PIPELINE_ID).unwrap().expanded);
    }

    #[test]
    fn declared_namespace_cycle_fails_construction() {
        let mut namespaces = IndexMap::new();
        namespaces.insert(
            "a".to_string(),
            RawModularPipeline {
                name: None,
                children: vec!["b".to_string()],
            },
        );
        namespaces.insert(
            "b".to_string(),
            RawModularPipeline {
                name: None,
                children: vec!["a".to_string()],
            },
        );
        let doc = RawDocument {
            nodes: Some(vec![raw_node("n", &[])]),
            edges: Some(vec![]),
            modular_pipelines: Some(namespaces),
            ..RawDocument::default()
        };
        let state = normalize(&doc).unwrap();
        let err = ModularPipelineTree::build(&state, false).unwrap_err();
        assert!(err.id == "a" || err.id == "b");
    }

    #[test]
    fn declared_node_children_are_registered() {
        let mut namespaces = IndexMap::new();
        namespaces.insert(
            "prep".to_string(),
            RawModularPipeline {
                name: None,
                children: vec!["clean".to_string(), "ghost".to_string()],
            },
        );
        let doc = RawDocument {
            nodes: Some(vec![raw_node("clean", &[])]),
            edges: Some(vec![]),
            modular_pipelines: Some(namespaces),
            ..RawDocument::default()
        };
        let state = normalize(&doc).unwrap();
        let tree = ModularPipelineTree::build(&state, false).unwrap();
        assert!(tree.get("prep").unwrap().nodes.contains("clean"));
        assert!(!tree.get("prep").unwrap().nodes.contains("ghost"));
    }
}
