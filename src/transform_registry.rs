//! Transform registry: the catalogue of invocable transforms.
//!
//! Each transform is registered as a [`TransformDescriptor`], which holds its
//! metadata plus a loader. The loader runs only when the transform is first
//! used, and the loaded implementation is cached for the rest of the process.

use async_trait::async_trait;
use convert_case::{Case, Casing};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::node::{Node, NodeId};
use crate::options::{BoundOptions, OptionSchema};
use crate::store::{Changeset, EdgeRef};

/// Applicability wildcard in a descriptor's `types`.
pub const ANY_TYPE: &str = "*";

/// Error type for transform operations
#[derive(Debug, Clone, PartialEq)]
pub enum TransformError {
    /// No transform registered under this name or alias
    UnknownTransform(String),
    /// The implementation could not be loaded
    LoadFailed { name: String, reason: String },
    /// The transform rejected its input or options
    InvalidArgs(String),
    /// The transform failed while running (network, upstream data...)
    ExecutionError(String),
    /// The invocation did not settle in time
    Timeout(Duration),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::UnknownTransform(name) => write!(f, "Unknown transform: {}", name),
            TransformError::LoadFailed { name, reason } => {
                write!(f, "Failed to load transform {}: {}", name, reason)
            }
            TransformError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            TransformError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            TransformError::Timeout(d) => write!(f, "Timed out after {:?}", d),
        }
    }
}

impl std::error::Error for TransformError {}

/// Nodes and links produced by one transform invocation.
///
/// Transforms never touch the graph; they describe what to add and the
/// runner merges it.
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    nodes: Vec<Node>,
    links: Vec<(NodeId, NodeId)>,
}

impl TransformOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node` and an edge from `source` to it.
    pub fn link(&mut self, source: NodeId, node: Node) -> NodeId {
        let id = node.id();
        self.links.push((source, id));
        self.nodes.push(node);
        id
    }

    /// Add `node` without linking it.
    pub fn push(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.push(node);
        id
    }

    /// Add an edge between two nodes that already exist (in the graph or in this output).
    pub fn connect(&mut self, source: NodeId, target: NodeId) {
        self.links.push((source, target));
    }

    pub fn extend(&mut self, other: TransformOutput) {
        self.nodes.extend(other.nodes);
        self.links.extend(other.links);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    /// Turn into a changeset, stamping every edge with the transform name.
    pub fn into_changeset(self, transform: &str) -> Changeset {
        let mut edges: Vec<EdgeRef> = self
            .links
            .into_iter()
            .map(|(source, target)| EdgeRef {
                source,
                target,
                transform: transform.to_string(),
            })
            .collect();

        let nodes = self
            .nodes
            .into_iter()
            .map(|mut node| {
                let source = node.id();
                edges.extend(node.take_edges().into_iter().map(|edge| EdgeRef {
                    source,
                    target: edge.target,
                    transform: edge.transform,
                }));
                node
            })
            .collect();

        Changeset { nodes, edges }
    }
}

/// A loaded, executable transform.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Run against a single input node.
    async fn run(
        &self,
        node: &Node,
        options: &BoundOptions,
    ) -> Result<TransformOutput, TransformError>;

    /// Whether the runner should hand over all eligible nodes in one call.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Run against the whole eligible set at once.
    /// Default implementation calls run() for each node
    async fn run_batch(
        &self,
        nodes: &[Node],
        options: &BoundOptions,
    ) -> Result<TransformOutput, TransformError> {
        let mut output = TransformOutput::new();
        for node in nodes {
            output.extend(self.run(node, options).await?);
        }
        Ok(output)
    }
}

/// Simple function-based implementation of Transform
#[async_trait]
impl<F> Transform for F
where
    F: Fn(&Node, &BoundOptions) -> Result<TransformOutput, TransformError> + Send + Sync,
{
    async fn run(
        &self,
        node: &Node,
        options: &BoundOptions,
    ) -> Result<TransformOutput, TransformError> {
        self(node, options)
    }
}

/// Descriptor metadata, as written in a transform catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformMeta {
    #[serde(default)]
    pub alias: Vec<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "any_type")]
    pub types: Vec<String>,
    #[serde(default)]
    pub options: OptionSchema,
}

fn any_type() -> Vec<String> {
    vec![ANY_TYPE.to_string()]
}

impl Default for TransformMeta {
    fn default() -> Self {
        Self {
            alias: Vec::new(),
            title: String::new(),
            description: String::new(),
            types: any_type(),
            options: OptionSchema::new(),
        }
    }
}

impl TransformMeta {
    /// Whether nodes of `node_type` are acceptable input.
    pub fn applies_to(&self, node_type: &str) -> bool {
        self.types.iter().any(|t| t == ANY_TYPE || t == node_type)
    }
}

/// Deferred constructor of a transform implementation.
pub type Loader = Arc<dyn Fn() -> Result<Arc<dyn Transform>, TransformError> + Send + Sync>;

/// A registered transform: name, metadata and loader.
#[derive(Clone)]
pub struct TransformDescriptor {
    pub name: String,
    pub meta: TransformMeta,
    loader: Loader,
}

impl TransformDescriptor {
    pub fn new(name: impl Into<String>, meta: TransformMeta, loader: Loader) -> Self {
        Self {
            name: name.into(),
            meta,
            loader,
        }
    }

    /// Descriptor whose loader just hands out an already-built implementation.
    pub fn from_transform(
        name: impl Into<String>,
        meta: TransformMeta,
        transform: Arc<dyn Transform>,
    ) -> Self {
        let loader =
            move || -> Result<Arc<dyn Transform>, TransformError> { Ok(transform.clone()) };
        Self::new(name, meta, Arc::new(loader))
    }

    /// Lower-cased keys this descriptor answers to: its name, the snake_case
    /// form of its name, and its aliases.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = IndexSet::new();
        keys.insert(self.name.to_lowercase());
        keys.insert(self.name.to_case(Case::Snake).to_lowercase());
        keys.extend(self.meta.alias.iter().map(|a| a.to_lowercase()));
        keys.into_iter().collect()
    }
}

impl fmt::Debug for TransformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformDescriptor")
            .field("name", &self.name)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Registry of transform descriptors, with a cache of loaded implementations
pub struct TransformRegistry {
    descriptors: IndexMap<String, TransformDescriptor>,
    keys: HashMap<String, String>,
    loaded: Mutex<HashMap<String, Arc<dyn Transform>>>,
}

impl TransformRegistry {
    /// Create a new empty transform registry
    pub fn new() -> Self {
        Self {
            descriptors: IndexMap::new(),
            keys: HashMap::new(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Register a transform.
    ///
    /// A later registration under the same name (in any case) replaces the
    /// earlier one. An alias already used by another transform is taken over,
    /// except when it is that transform's own name.
    pub fn register(&mut self, descriptor: TransformDescriptor) {
        let name = descriptor.name.clone();
        let canonical = name.to_lowercase();

        let replaced: Vec<String> = self
            .descriptors
            .keys()
            .filter(|n| n.to_lowercase() == canonical)
            .cloned()
            .collect();
        for old in &replaced {
            self.descriptors.shift_remove(old);
            self.cache().remove(old);
        }
        self.keys.retain(|_, holder| !replaced.contains(holder));

        for key in descriptor.keys() {
            match self.keys.get(&key) {
                Some(holder) if key != canonical && holder.to_lowercase() == key => {
                    tracing::warn!("{}: '{}' names transform {}; alias ignored", name, key, holder);
                    continue;
                }
                Some(holder) => {
                    tracing::warn!("Transform key '{}' moved from {} to {}", key, holder, name);
                }
                None => {}
            }
            self.keys.insert(key, name.clone());
        }

        self.descriptors.insert(name.clone(), descriptor);
        if replaced.is_empty() {
            tracing::debug!("Registered transform {}", name);
        } else {
            tracing::debug!("Replaced transform {}", name);
        }
    }

    /// Keys that currently resolve to the transform called `name`.
    pub fn keys_of(&self, name: &str) -> Vec<String> {
        self.descriptors
            .get(name)
            .map(|descriptor| {
                descriptor
                    .keys()
                    .into_iter()
                    .filter(|key| self.keys.get(key).map(String::as_str) == Some(name))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Find a descriptor by name or alias, ignoring case.
    pub fn resolve(&self, name: &str) -> Result<&TransformDescriptor, TransformError> {
        self.keys
            .get(&name.to_lowercase())
            .and_then(|canonical| self.descriptors.get(canonical))
            .ok_or_else(|| TransformError::UnknownTransform(name.to_string()))
    }

    /// Load the implementation of a transform, at most once per process.
    pub fn load(&self, name: &str) -> Result<Arc<dyn Transform>, TransformError> {
        let descriptor = self.resolve(name)?;
        let mut cache = self.cache();

        if let Some(transform) = cache.get(&descriptor.name) {
            return Ok(transform.clone());
        }

        let transform = (descriptor.loader)().map_err(|e| match e {
            TransformError::LoadFailed { .. } => e,
            other => TransformError::LoadFailed {
                name: descriptor.name.clone(),
                reason: other.to_string(),
            },
        })?;

        tracing::info!("Loaded transform {}", descriptor.name);
        cache.insert(descriptor.name.clone(), transform.clone());
        Ok(transform)
    }

    /// Check if a transform is registered under this name or alias
    pub fn has_transform(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Canonical names in registration order
    pub fn list_transforms(&self) -> Vec<String> {
        self.descriptors.keys().cloned().collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &TransformDescriptor> {
        self.descriptors.values()
    }

    pub fn count(&self) -> usize {
        self.descriptors.len()
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Transform>>> {
        // A poisoned cache only means a loader panicked; the map itself is intact.
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo(node: &Node, _options: &BoundOptions) -> Result<TransformOutput, TransformError> {
        let mut output = TransformOutput::new();
        output.link(node.id(), Node::new(node.node_type(), node.label()));
        Ok(output)
    }

    fn meta(aliases: &[&str], types: &[&str]) -> TransformMeta {
        TransformMeta {
            alias: aliases.iter().map(|s| s.to_string()).collect(),
            title: "Test".to_string(),
            description: "Test transform".to_string(),
            types: types.iter().map(|s| s.to_string()).collect(),
            options: OptionSchema::new(),
        }
    }

    #[test]
    fn test_resolve_is_case_insensitive_and_alias_aware() {
        let mut registry = TransformRegistry::new();
        registry.register(TransformDescriptor::from_transform(
            "cloudflareDnsQuery",
            meta(&["cfdq"], &["*"]),
            Arc::new(echo),
        ));

        let keys = [
            "cloudflareDnsQuery",
            "CLOUDFLAREDNSQUERY",
            "cloudflare_dns_query",
            "CFDQ",
            "cfdq",
        ];
        for key in keys {
            assert_eq!(registry.resolve(key).unwrap().name, "cloudflareDnsQuery", "key {}", key);
        }
    }

    #[test]
    fn test_transform_not_found() {
        let registry = TransformRegistry::new();

        let result = registry.resolve("nonexistent");
        assert!(matches!(result, Err(TransformError::UnknownTransform(_))));
        assert!(matches!(registry.load("nonexistent"), Err(TransformError::UnknownTransform(_))));
    }

    #[test]
    fn test_load_is_lazy_and_cached() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();

        let mut registry = TransformRegistry::new();
        registry.register(TransformDescriptor::new(
            "echo",
            meta(&[], &["*"]),
            Arc::new(move || -> Result<Arc<dyn Transform>, TransformError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(echo) as Arc<dyn Transform>)
            }),
        ));

        assert_eq!(loads.load(Ordering::SeqCst), 0);
        registry.load("echo").unwrap();
        registry.load("ECHO").unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_failure_is_reported() {
        let mut registry = TransformRegistry::new();
        registry.register(TransformDescriptor::new(
            "broken",
            meta(&[], &["*"]),
            Arc::new(|| -> Result<Arc<dyn Transform>, TransformError> {
                Err(TransformError::ExecutionError("module missing".to_string()))
            }),
        ));

        let err = registry.load("broken").err().unwrap();
        assert_eq!(
            err,
            TransformError::LoadFailed {
                name: "broken".to_string(),
                reason: "Execution error: module missing".to_string(),
            }
        );
    }

    #[test]
    fn test_late_registration_replaces() {
        let mut registry = TransformRegistry::new();
        registry.register(TransformDescriptor::from_transform(
            "echo",
            meta(&[], &["*"]),
            Arc::new(echo),
        ));
        registry.register(TransformDescriptor::from_transform(
            "echo",
            meta(&["e"], &["domain"]),
            Arc::new(echo),
        ));

        assert_eq!(registry.count(), 1);
        assert!(registry.has_transform("e"));
        assert!(!registry.resolve("echo").unwrap().meta.applies_to("ip"));
    }

    #[test]
    fn test_alias_taken_over_by_later_registration() {
        let mut registry = TransformRegistry::new();
        registry.register(TransformDescriptor::from_transform(
            "dnsResolve",
            meta(&["dnsr"], &["*"]),
            Arc::new(echo),
        ));
        registry.register(TransformDescriptor::from_transform(
            "myDns",
            meta(&["dnsr"], &["*"]),
            Arc::new(echo),
        ));

        assert_eq!(registry.resolve("dnsr").unwrap().name, "myDns");
        assert_eq!(registry.keys_of("dnsResolve"), vec!["dnsresolve", "dns_resolve"]);
        assert_eq!(registry.keys_of("myDns"), vec!["mydns", "my_dns", "dnsr"]);
    }

    #[test]
    fn test_alias_cannot_shadow_a_name() {
        let mut registry = TransformRegistry::new();
        registry.register(TransformDescriptor::from_transform(
            "echo",
            meta(&[], &["*"]),
            Arc::new(echo),
        ));
        registry.register(TransformDescriptor::from_transform(
            "loud",
            meta(&["echo"], &["*"]),
            Arc::new(echo),
        ));

        assert_eq!(registry.resolve("echo").unwrap().name, "echo");
        assert_eq!(registry.keys_of("loud"), vec!["loud"]);
    }

    #[test]
    fn test_name_in_other_case_replaces() {
        let mut registry = TransformRegistry::new();
        registry.register(TransformDescriptor::from_transform(
            "echo",
            meta(&["e"], &["*"]),
            Arc::new(echo),
        ));
        registry.register(TransformDescriptor::from_transform(
            "Echo",
            meta(&[], &["*"]),
            Arc::new(echo),
        ));

        assert_eq!(registry.list_transforms(), vec!["Echo"]);
        assert!(!registry.has_transform("e"));
    }

    #[test]
    fn test_applicability() {
        assert!(meta(&[], &["*"]).applies_to("anything"));
        assert!(meta(&[], &["domain", "string"]).applies_to("string"));
        assert!(!meta(&[], &["domain"]).applies_to("ip"));
    }

    #[test]
    fn test_meta_defaults_to_any_type() {
        let meta: TransformMeta = serde_yaml::from_str("title: Nop\n").unwrap();
        assert_eq!(meta.types, vec![ANY_TYPE.to_string()]);
    }

    #[tokio::test]
    async fn test_default_batch_runs_each_node() {
        let nodes = vec![Node::new("domain", "a.com"), Node::new("domain", "b.com")];
        let transform: Arc<dyn Transform> = Arc::new(echo);

        let output = transform.run_batch(&nodes, &BoundOptions::new()).await.unwrap();
        assert_eq!(output.len(), 2);

        let changeset = output.into_changeset("echo");
        assert_eq!(changeset.edges.len(), 2);
        assert_eq!(changeset.edges[0].source, nodes[0].id());
        assert_eq!(changeset.edges[0].transform, "echo");
    }
}
