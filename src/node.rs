//! Node and edge types for the reconnaissance graph.
//!
//! A node is a typed entity (a domain, an IP, an account...) carrying a display
//! label, a small property bag and the list of edges leaving it. Nodes are
//! created either by seeding raw labels or as transform output; their `id` and
//! `type` never change afterwards.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Node type given to seeded raw labels.
pub const STRING_TYPE: &str = "string";

/// Node type of aggregate nodes produced by grouping.
pub const GROUP_TYPE: &str = "group";

/// Process-unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(NodeId)
    }
}

/// Mint a fresh identifier.
///
/// Random (v4) so that ids stay unique across transforms, runs and graphs
/// loaded from disk without any shared counter.
pub fn make_id() -> NodeId {
    NodeId(Uuid::new_v4())
}

/// Value stored in a node property.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::String(s) => write!(f, "{}", s),
            PropValue::Int(i) => write!(f, "{}", i),
            PropValue::Float(fl) => write!(f, "{}", fl),
            PropValue::Bool(b) => write!(f, "{}", b),
            PropValue::List(l) => write!(f, "{}", l.join(",")),
        }
    }
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Int(i) => Some(*i as f64),
            PropValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PropValue::List(l) => Some(l),
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::String(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::String(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<Vec<String>> for PropValue {
    fn from(value: Vec<String>) -> Self {
        PropValue::List(value)
    }
}

/// Ordered property bag.
pub type Props = IndexMap<String, PropValue>;

/// Directed edge, stored in the source node's edge list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Node the edge points to
    pub target: NodeId,
    /// Name of the transform that created the edge
    pub transform: String,
}

/// A vertex of the reconnaissance graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: String,
    label: String,
    #[serde(default)]
    props: Props,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl Node {
    /// Create a node with a fresh id and no edges.
    pub fn new(node_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: make_id(),
            node_type: node_type.into(),
            label: label.into(),
            props: Props::new(),
            edges: Vec::new(),
        }
    }

    /// Create a node carrying the given properties.
    pub fn with_props(
        node_type: impl Into<String>,
        label: impl Into<String>,
        props: Props,
    ) -> Self {
        Self {
            props,
            ..Self::new(node_type, label)
        }
    }

    /// Wrap a raw label into a `string` node, the way seeded input enters the graph.
    pub fn seed(label: impl Into<String>) -> Self {
        let label = label.into();
        Self::new(STRING_TYPE, label.clone()).with_prop(STRING_TYPE, label)
    }

    /// Builder-style property setter, used while a node is being constructed.
    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn prop(&self, key: &str) -> Option<&PropValue> {
        self.props.get(key)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub(crate) fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Detach the embedded edges so they are validated and committed with the
    /// rest of a changeset.
    pub(crate) fn take_edges(&mut self) -> Vec<Edge> {
        std::mem::take(&mut self.edges)
    }
}
