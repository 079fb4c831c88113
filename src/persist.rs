//! Reading and writing graphs as JSON documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::node::Node;
use crate::store::{GraphError, NodeStore};

/// Current graph document version.
pub const GRAPH_VERSION: u32 = 1;

/// Error type for graph persistence
#[derive(Debug)]
pub enum PersistError {
    IoError(std::io::Error),
    JsonError(serde_json::Error),
    UnsupportedVersion(u32),
    Graph(GraphError),
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        PersistError::IoError(err)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::JsonError(err)
    }
}

impl From<GraphError> for PersistError {
    fn from(err: GraphError) -> Self {
        PersistError::Graph(err)
    }
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::IoError(e) => write!(f, "IO error: {}", e),
            PersistError::JsonError(e) => write!(f, "JSON error: {}", e),
            PersistError::UnsupportedVersion(v) => write!(f, "Unsupported graph version: {}", v),
            PersistError::Graph(e) => write!(f, "Invalid graph: {}", e),
        }
    }
}

impl std::error::Error for PersistError {}

/// On-disk form of a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub nodes: Vec<Node>,
}

impl GraphDocument {
    pub fn from_store(store: &NodeStore) -> Self {
        Self {
            version: GRAPH_VERSION,
            saved_at: Utc::now(),
            nodes: store.nodes().cloned().collect(),
        }
    }
}

/// Load the graph in `path` into `store`. Returns the number of nodes read.
///
/// The document is validated as a whole; on error the store is unchanged.
pub fn read_graph<P: AsRef<Path>>(path: P, store: &mut NodeStore) -> Result<usize, PersistError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let document: GraphDocument = serde_json::from_str(&contents)?;

    if document.version != GRAPH_VERSION {
        return Err(PersistError::UnsupportedVersion(document.version));
    }

    let count = document.nodes.len();
    store.add_nodes(document.nodes)?;

    tracing::info!("Read {} nodes from {}", count, path.display());
    Ok(count)
}

/// Save the whole graph in `store` to `path`.
pub fn write_graph<P: AsRef<Path>>(path: P, store: &NodeStore) -> Result<(), PersistError> {
    let path = path.as_ref();
    let document = GraphDocument::from_store(store);
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(path, json)?;

    tracing::info!("Wrote {} nodes to {}", document.nodes.len(), path.display());
    Ok(())
}
