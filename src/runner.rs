//! Transform execution: bind options, fan out over eligible nodes, fan in,
//! merge the surviving output into the store.
//!
//! Per-node failures are captured as [`InvocationError`] values and never
//! abort sibling work. Only an unknown transform, a load failure or a broken
//! graph invariant make a run fail as a whole.

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::extraction::ExtractionSpec;
use crate::node::{Node, NodeId};
use crate::options::{self, OptionWarning};
use crate::store::{Changeset, GraphError, NodeStore};
use crate::transform_registry::{TransformError, TransformOutput, TransformRegistry};

/// A failure of one invocation, tagged with the input node it was for.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationError {
    pub node_id: NodeId,
    pub transform: String,
    pub error: TransformError,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed on node {}: {}", self.transform, self.node_id, self.error)
    }
}

impl std::error::Error for InvocationError {}

/// Fatal run failure
#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    Transform(TransformError),
    Graph(GraphError),
}

impl From<TransformError> for RunError {
    fn from(err: TransformError) -> Self {
        RunError::Transform(err)
    }
}

impl From<GraphError> for RunError {
    fn from(err: GraphError) -> Self {
        RunError::Graph(err)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Transform(e) => write!(f, "{}", e),
            RunError::Graph(e) => write!(f, "Graph invariant violated: {}", e),
        }
    }
}

impl std::error::Error for RunError {}

/// Outcome of one transform run.
#[derive(Debug, Clone, Default)]
pub struct TransformResult {
    /// Canonical name of the transform that ran
    pub transform: String,
    /// New nodes, in input order, as committed to the store
    pub nodes: Vec<Node>,
    /// Extracted values, parallel to `nodes`, when extraction was requested
    pub extracted: Option<Vec<String>>,
    /// Input nodes the transform does not apply to
    pub skipped: Vec<NodeId>,
    /// Per-node failures
    pub errors: Vec<InvocationError>,
    /// Option binding problems
    pub warnings: Vec<OptionWarning>,
}

impl TransformResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Runner settings.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Upper bound for a single invocation. `None` waits indefinitely.
    pub invocation_timeout: Option<Duration>,
}

/// Executes transforms from a registry against a node store.
pub struct TransformRunner<'r> {
    registry: &'r TransformRegistry,
    config: RunnerConfig,
}

impl<'r> TransformRunner<'r> {
    pub fn new(registry: &'r TransformRegistry) -> Self {
        Self::with_config(registry, RunnerConfig::default())
    }

    pub fn with_config(registry: &'r TransformRegistry, config: RunnerConfig) -> Self {
        Self { registry, config }
    }

    /// Run `name` against the store's active set.
    pub async fn run(
        &self,
        store: &mut NodeStore,
        name: &str,
        options: &HashMap<String, String>,
        extraction: Option<&ExtractionSpec>,
    ) -> Result<TransformResult, RunError> {
        let inputs: Vec<Node> = store.active_set().into_iter().cloned().collect();
        self.run_on(store, name, options, extraction, inputs).await
    }

    /// Run `name` against explicit input nodes.
    ///
    /// On return the new nodes are merged into `store` and form its active set.
    /// When no input is applicable, nothing is loaded and the store is left as is.
    pub async fn run_on(
        &self,
        store: &mut NodeStore,
        name: &str,
        options: &HashMap<String, String>,
        extraction: Option<&ExtractionSpec>,
        inputs: Vec<Node>,
    ) -> Result<TransformResult, RunError> {
        let descriptor = self.registry.resolve(name)?;
        let transform_name = descriptor.name.clone();

        let (bound, warnings) = options::bind(&descriptor.meta.options, options);
        for warning in &warnings {
            tracing::warn!("{}: {}", transform_name, warning);
        }

        let (eligible, skipped): (Vec<Node>, Vec<Node>) = inputs
            .into_iter()
            .partition(|node| descriptor.meta.applies_to(node.node_type()));

        let mut result = TransformResult {
            transform: transform_name.clone(),
            skipped: skipped.iter().map(|n| n.id()).collect(),
            warnings,
            extracted: extraction.map(|_| Vec::new()),
            ..Default::default()
        };

        if !result.skipped.is_empty() {
            tracing::debug!(
                "{}: skipping {} inapplicable nodes",
                transform_name,
                result.skipped.len()
            );
        }

        if eligible.is_empty() {
            tracing::info!("{}: no applicable input", transform_name);
            return Ok(result);
        }

        let transform = self.registry.load(&transform_name)?;

        tracing::info!("Running {} on {} nodes", transform_name, eligible.len());

        let outcomes: Vec<(Vec<NodeId>, Result<TransformOutput, TransformError>)> =
            if transform.supports_batch() {
                let ids = eligible.iter().map(|n| n.id()).collect();
                let outcome = self.settle(transform.run_batch(&eligible, &bound)).await;
                vec![(ids, outcome)]
            } else {
                let invocations = eligible
                    .iter()
                    .map(|node| self.settle(transform.run(node, &bound)));
                let settled = join_all(invocations).await;
                eligible.iter().map(|n| vec![n.id()]).zip(settled).collect()
            };

        let mut accepted = Changeset::new();
        let mut pending: HashSet<NodeId> = HashSet::new();
        let mut produced: Vec<NodeId> = Vec::new();

        for (input_ids, outcome) in outcomes {
            let failure = match outcome {
                Ok(output) => {
                    let changeset = output.into_changeset(&transform_name);
                    match store.validate(&changeset, &pending) {
                        Ok(()) => {
                            let ids: Vec<NodeId> = changeset.node_ids().collect();
                            pending.extend(ids.iter().copied());
                            produced.extend(ids);
                            accepted.absorb(changeset);
                            None
                        }
                        Err(e) => Some(TransformError::ExecutionError(format!(
                            "output rejected: {}",
                            e
                        ))),
                    }
                }
                Err(e) => Some(e),
            };

            if let Some(error) = failure {
                for node_id in input_ids {
                    tracing::debug!("{} failed on node {}: {}", transform_name, node_id, error);
                    result.errors.push(InvocationError {
                        node_id,
                        transform: transform_name.clone(),
                        error: error.clone(),
                    });
                }
            }
        }

        if !accepted.is_empty() {
            store.merge(accepted)?;
        }
        store.set_active(produced.clone());

        result.nodes = produced.iter().filter_map(|id| store.get(id)).cloned().collect();
        if let Some(spec) = extraction {
            result.extracted = Some(spec.apply(&result.nodes));
        }

        tracing::info!(
            "{} produced {} nodes ({} errors, {} skipped)",
            transform_name,
            result.nodes.len(),
            result.errors.len(),
            result.skipped.len()
        );

        Ok(result)
    }

    async fn settle<F>(&self, invocation: F) -> Result<TransformOutput, TransformError>
    where
        F: Future<Output = Result<TransformOutput, TransformError>>,
    {
        match self.config.invocation_timeout {
            Some(limit) => tokio::time::timeout(limit, invocation)
                .await
                .unwrap_or_else(|_| Err(TransformError::Timeout(limit))),
            None => invocation.await,
        }
    }
}
