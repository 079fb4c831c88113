//! # Scout: Reconnaissance Graph Engine
//!
//! Scout keeps a graph of typed [`Node`]s and grows it by running named
//! transforms over a working set of nodes. Every node a transform emits is
//! linked back to the node it was derived from.
//!
//! ## Features
//!
//! - **Node store**: id-keyed graph with an active set and atomic merges
//! - **Transform registry**: lazy, case-insensitive lookup by name, snake_case name or alias
//! - **Transform runner**: concurrent per-node fan-out with ordered fan-in and per-node errors
//! - **Selection and grouping**: narrow the active set by label or `/regex/`,
//!   partition it by a field
//! - **Extraction**: pull one field per node as decorated strings
//!
//! ## Example: CLI
//!
//! ```text
//! scout transform dnsr --family ipv4 -e props.ip example.com
//! scout t echo -g type -w graph.json a.com b.com
//! scout t nop -r graph.json -s '/^a\./'
//! ```
//!
//! ## Example: catalogue entry
//!
//! ```yaml
//! dnsResolve:
//!   alias: [dnsr]
//!   title: DNS Resolve
//!   description: Resolve domain names to IP addresses with the system resolver.
//!   types: [domain, string]
//!   options:
//!     family:
//!       description: Address family to keep (any, ipv4, ipv6)
//!       type: string
//!       default: any
//! ```

// Graph model
pub mod node;
pub mod store;
pub mod select;
pub mod group;
pub mod extraction;

// Transforms and their execution
pub mod options;
pub mod transform_registry;
pub mod runner;
pub mod transforms;

// Surfaces
pub mod serialization;
pub mod persist;
pub mod config;
pub mod cli;

// Re-export key types
pub use node::{Edge, Node, NodeId, PropValue, Props};
pub use store::{Changeset, EdgeRef, GraphError, NodeStore};
pub use extraction::{ExtractionSpec, Extractor, FieldPath};
pub use options::{BoundOptions, OptionKind, OptionSchema, OptionSpec, OptionWarning};
pub use transform_registry::{
    Transform, TransformDescriptor, TransformError, TransformMeta, TransformOutput,
    TransformRegistry,
};
pub use runner::{InvocationError, RunError, RunnerConfig, TransformResult, TransformRunner};
pub use transforms::builtin_registry;
pub use serialization::OutputFormat;
pub use config::ScoutConfig;
