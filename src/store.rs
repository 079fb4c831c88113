//! The node store: sole owner of the live graph.
//!
//! Every mutation goes through [`NodeStore::add_nodes`] or
//! [`NodeStore::merge`], both of which validate the complete change before
//! applying any of it. A graph is therefore never left half-updated, and
//! every edge in it resolves to a node that exists.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

use crate::extraction::FieldPath;
use crate::group;
use crate::node::{Edge, Node, NodeId};
use crate::select;

/// Provenance recorded on edges from group nodes to their members.
pub const GROUP_PROVENANCE: &str = "group";

/// Error type for graph operations
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A node id is already present. Ids are random, so this is an internal bug.
    DuplicateId(NodeId),
    /// An edge references a node that is neither in the graph nor in the change.
    DanglingEdge { source: NodeId, target: NodeId },
    /// A selection matched no node.
    NoMatch(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateId(id) => write!(f, "Duplicate node id: {}", id),
            GraphError::DanglingEdge { source, target } => {
                write!(f, "Edge {} -> {} references an unknown node", source, target)
            }
            GraphError::NoMatch(pattern) => write!(f, "No node matches selection: {}", pattern),
        }
    }
}

impl std::error::Error for GraphError {}

/// An edge waiting to be committed, with its source spelled out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRef {
    pub source: NodeId,
    pub target: NodeId,
    pub transform: String,
}

/// New nodes and edges to be committed together.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub nodes: Vec<Node>,
    pub edges: Vec<EdgeRef>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Append another changeset, keeping order.
    pub fn absorb(&mut self, other: Changeset) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id())
    }
}

/// Owner of the graph and of the active node set.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: IndexMap<NodeId, Node>,
    active: Vec<NodeId>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Add nodes as-is. Edges they already carry must resolve within the
    /// graph or the batch itself.
    pub fn add_nodes(&mut self, nodes: Vec<Node>) -> Result<(), GraphError> {
        let mut changeset = Changeset::new();
        for mut node in nodes {
            let source = node.id();
            for edge in node.take_edges() {
                changeset.edges.push(EdgeRef {
                    source,
                    target: edge.target,
                    transform: edge.transform,
                });
            }
            changeset.nodes.push(node);
        }
        self.merge(changeset)
    }

    /// Wrap raw labels into `string` nodes, add them and make them the active set.
    pub fn seed<I, S>(&mut self, labels: I) -> Result<Vec<NodeId>, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nodes: Vec<Node> = labels.into_iter().map(Node::seed).collect();
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id()).collect();

        self.add_nodes(nodes)?;
        self.active = ids.clone();

        tracing::debug!("Seeded {} nodes", ids.len());
        Ok(ids)
    }

    /// Check that `changeset` could be merged.
    ///
    /// `pending` holds ids that will be committed alongside it (output of
    /// sibling invocations already accepted); they count as present for edge
    /// resolution and as taken for uniqueness.
    pub fn validate(
        &self,
        changeset: &Changeset,
        pending: &HashSet<NodeId>,
    ) -> Result<(), GraphError> {
        let mut fresh: HashSet<NodeId> = HashSet::with_capacity(changeset.nodes.len());

        for node in &changeset.nodes {
            let id = node.id();
            if self.contains(&id) || pending.contains(&id) || !fresh.insert(id) {
                return Err(GraphError::DuplicateId(id));
            }
        }

        let known = |id: &NodeId| self.contains(id) || pending.contains(id) || fresh.contains(id);

        for edge in &changeset.edges {
            if !known(&edge.source) || !known(&edge.target) {
                return Err(GraphError::DanglingEdge {
                    source: edge.source,
                    target: edge.target,
                });
            }
        }

        // Edges already embedded in incoming nodes obey the same rule.
        for node in &changeset.nodes {
            for edge in node.edges() {
                if !known(&edge.target) {
                    return Err(GraphError::DanglingEdge {
                        source: node.id(),
                        target: edge.target,
                    });
                }
            }
        }

        Ok(())
    }

    /// Commit a changeset: all of it, or none of it on error.
    pub fn merge(&mut self, changeset: Changeset) -> Result<(), GraphError> {
        self.validate(&changeset, &HashSet::new())?;

        let node_count = changeset.nodes.len();
        let edge_count = changeset.edges.len();

        for node in changeset.nodes {
            self.nodes.insert(node.id(), node);
        }

        for edge in changeset.edges {
            // Validated above; the source is present.
            if let Some(source) = self.nodes.get_mut(&edge.source) {
                source.push_edge(Edge {
                    target: edge.target,
                    transform: edge.transform,
                });
            }
        }

        tracing::debug!("Merged {} nodes and {} edges", node_count, edge_count);
        Ok(())
    }

    /// The nodes currently eligible as transform input.
    pub fn active_set(&self) -> Vec<&Node> {
        self.active.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    pub fn active_ids(&self) -> &[NodeId] {
        &self.active
    }

    /// Replace the active set. Unknown ids are ignored.
    pub fn set_active(&mut self, ids: Vec<NodeId>) {
        self.active = ids.into_iter().filter(|id| self.nodes.contains_key(id)).collect();
    }

    /// Narrow the active set to nodes matching any pattern, searching the whole graph.
    ///
    /// When nothing matches, the active set becomes empty and `NoMatch` is returned;
    /// callers treat that as a warning.
    pub fn select<S: AsRef<str>>(&mut self, patterns: &[S]) -> Result<Vec<NodeId>, GraphError> {
        let ids: Vec<NodeId> = select::select(self.nodes.values(), patterns)
            .into_iter()
            .map(|n| n.id())
            .collect();

        self.active = ids.clone();

        if ids.is_empty() {
            let joined = patterns.iter().map(|p| p.as_ref()).collect::<Vec<_>>().join(", ");
            tracing::warn!("Selection matched no node: {}", joined);
            return Err(GraphError::NoMatch(joined));
        }

        tracing::debug!("Selected {} nodes", ids.len());
        Ok(ids)
    }

    /// Group the active set by `key`, add the group nodes (linked to their
    /// members) and make them the active set. Returns the committed group nodes.
    pub fn group(&mut self, key: &FieldPath) -> Result<Vec<Node>, GraphError> {
        let groups = group::group(self.active_set(), key);

        let mut changeset = Changeset::new();
        for g in &groups {
            for member in group::members(g) {
                changeset.edges.push(EdgeRef {
                    source: g.id(),
                    target: member,
                    transform: GROUP_PROVENANCE.to_string(),
                });
            }
        }
        let ids: Vec<NodeId> = groups.iter().map(|g| g.id()).collect();
        changeset.nodes = groups;

        self.merge(changeset)?;
        self.active = ids.clone();

        tracing::debug!("Grouped active set by {} into {} groups", key, ids.len());
        Ok(ids.iter().filter_map(|id| self.nodes.get(id)).cloned().collect())
    }
}
