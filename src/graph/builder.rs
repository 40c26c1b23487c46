//! Executable graph and its builder.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use crate::node::Node;
use crate::services::Redactor;
use crate::types::NodeKind;

/// A compiled, immutable execution graph.
///
/// `Start` and `End` are virtual: they appear in edges and frontiers but
/// have no handler. Scheduling walks `edges` unless a node overrides its
/// route.
pub struct Graph {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    entry: NodeKind,
    interrupt_before: FxHashSet<NodeKind>,
    redactor: Option<Redactor>,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn node(&self, kind: &NodeKind) -> Option<&Arc<dyn Node>> {
        self.nodes.get(kind)
    }

    pub fn contains(&self, kind: &NodeKind) -> bool {
        kind.is_virtual() || self.nodes.contains_key(kind)
    }

    /// Static successors of `kind`; empty for terminal nodes.
    pub fn successors(&self, kind: &NodeKind) -> &[NodeKind] {
        self.edges.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry(&self) -> &NodeKind {
        &self.entry
    }

    pub fn should_interrupt_before(&self, kind: &NodeKind) -> bool {
        self.interrupt_before.contains(kind)
    }

    /// Input scrubber carried over from the compiling services, if any.
    pub fn redactor(&self) -> Option<&Redactor> {
        self.redactor.as_ref()
    }

    /// All non-virtual nodes, for introspection and tests.
    pub fn node_kinds(&self) -> Vec<NodeKind> {
        let mut kinds: Vec<NodeKind> = self.nodes.keys().cloned().collect();
        kinds.sort_by_key(NodeKind::encode);
        kinds
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_kinds())
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

/// Incremental graph assembly. Used directly in tests; production graphs
/// come out of [`compile`](super::compile::compile).
pub struct GraphBuilder {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    entry: NodeKind,
    interrupt_before: FxHashSet<NodeKind>,
    redactor: Option<Redactor>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            entry: NodeKind::Preprocess,
            interrupt_before: FxHashSet::default(),
            redactor: None,
        }
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn add_node(mut self, kind: NodeKind, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(kind, node);
        self
    }

    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.entry(from).or_default().push(to);
        self
    }

    #[must_use]
    pub fn entry(mut self, kind: NodeKind) -> Self {
        self.entry = kind;
        self
    }

    /// Pause execution whenever `kind` is about to run.
    #[must_use]
    pub fn interrupt_before(mut self, kind: NodeKind) -> Self {
        self.interrupt_before.insert(kind);
        self
    }

    /// Scrub incoming input before it is persisted or logged.
    #[must_use]
    pub fn redactor(mut self, redactor: Option<Redactor>) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn build(self) -> Graph {
        Graph {
            nodes: self.nodes,
            edges: self.edges,
            entry: self.entry,
            interrupt_before: self.interrupt_before,
            redactor: self.redactor,
        }
    }
}
