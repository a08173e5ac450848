//! Derivation facade tying the components together the way the rendering
//! collaborator consumes them: one immutable normalized snapshot, mutable
//! filter/collapse state, and memoized derived views. Each derived view is
//! cached against a version counter of its actual inputs, so toggling a tag
//! never forces re-contraction and expanding a namespace never forces the
//! disabled flags to be resolved again.

use tracing::debug;

use crate::contract::{contract, ContractedGraph};
use crate::graph::NodeType;
use crate::normalize::NormalizedState;
use crate::tree::{ModularPipelineTree, NamespaceCycleError};
use crate::visibility::{resolve_disabled, DisabledFlags, FilterState};

/// Single-slot cache for one derived view, keyed by the version of its
/// inputs. Derivation-scoped and owned by the view; nothing global.
struct Memo<K, V> {
    slot: Option<(K, V)>,
}

impl<K: PartialEq, V> Memo<K, V> {
    fn new() -> Self {
        Self { slot: None }
    }

    fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> &V {
        let stale = !matches!(&self.slot, Some((k, _)) if *k == key);
        if stale {
            let value = compute();
            return &self.slot.insert((key, value)).1;
        }
        match &self.slot {
            Some((_, value)) => value,
            None => unreachable!("fresh memo slot is always populated"),
        }
    }
}

pub struct PipelineView {
    state: NormalizedState,
    tree: ModularPipelineTree,
    filters: FilterState,
    collapse_version: u64,
    filter_version: u64,
    contracted: Memo<u64, ContractedGraph>,
    disabled: Memo<u64, DisabledFlags>,
}

impl PipelineView {
    pub fn new(state: NormalizedState, expand_all: bool) -> Result<Self, NamespaceCycleError> {
        let tree = ModularPipelineTree::build(&state, expand_all)?;
        Ok(Self {
            state,
            tree,
            filters: FilterState::default(),
            collapse_version: 0,
            filter_version: 0,
            contracted: Memo::new(),
            disabled: Memo::new(),
        })
    }

    pub fn state(&self) -> &NormalizedState {
        &self.state
    }

    pub fn tree(&self) -> &ModularPipelineTree {
        &self.tree
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn set_tag_enabled(&mut self, tag: &str, enabled: bool) {
        if !self.state.tags.contains_key(tag) {
            debug!("ignoring filter toggle for unknown tag `{}`", tag);
            return;
        }
        let changed = if enabled {
            self.filters.enabled_tags.insert(tag.to_string())
        } else {
            self.filters.enabled_tags.shift_remove(tag)
        };
        if changed {
            self.filter_version += 1;
        }
    }

    pub fn set_type_disabled(&mut self, node_type: NodeType, disabled: bool) {
        let changed = if disabled {
            self.filters.disabled_types.insert(node_type)
        } else {
            self.filters.disabled_types.shift_remove(&node_type)
        };
        if changed {
            self.filter_version += 1;
        }
    }

    pub fn set_focus(&mut self, focus: Option<String>) {
        if self.filters.focus != focus {
            self.filters.focus = focus;
            self.filter_version += 1;
        }
    }

    pub fn set_namespace_expanded(&mut self, id: &str, expanded: bool) {
        let before = self.tree.collapsed_ids();
        self.tree.set_expanded(id, expanded);
        if self.tree.collapsed_ids() != before {
            self.collapse_version += 1;
        }
    }

    pub fn toggle_namespace(&mut self, id: &str) {
        let expanded = self.tree.get(id).map(|e| e.expanded).unwrap_or(false);
        self.set_namespace_expanded(id, !expanded);
    }

    pub fn expand_all_namespaces(&mut self) {
        let before = self.tree.collapsed_ids();
        self.tree.expand_all();
        if self.tree.collapsed_ids() != before {
            self.collapse_version += 1;
        }
    }

    pub fn collapse_all_namespaces(&mut self) {
        let before = self.tree.collapsed_ids();
        self.tree.collapse_all();
        if self.tree.collapsed_ids() != before {
            self.collapse_version += 1;
        }
    }

    /// The graph to draw under the current collapse state.
    pub fn contracted(&mut self) -> &ContractedGraph {
        let Self {
            state,
            tree,
            contracted,
            collapse_version,
            ..
        } = self;
        contracted.get_or_compute(*collapse_version, || {
            debug!("recomputing contracted graph");
            contract(state, &tree.collapsed_ids())
        })
    }

    /// Disabled flags under the current filter state.
    pub fn disabled(&mut self) -> &DisabledFlags {
        let Self {
            state,
            filters,
            disabled,
            filter_version,
            ..
        } = self;
        disabled.get_or_compute(*filter_version, || {
            debug!("recomputing disabled flags");
            resolve_disabled(state, filters)
        })
    }
}
