//! Built-in transforms and the catalogue that registers them.
//!
//! Metadata lives in `catalogue.yaml`; implementations are bound by name
//! through [`factory`]. Nothing is constructed until a transform is loaded.

pub mod builtin;
pub mod dns;

use indexmap::IndexMap;
use std::sync::Arc;

use crate::transform_registry::{
    Loader, Transform, TransformDescriptor, TransformError, TransformMeta, TransformRegistry,
};

const CATALOGUE: &str = include_str!("catalogue.yaml");

/// Parse the embedded catalogue.
pub fn catalogue() -> Result<IndexMap<String, TransformMeta>, TransformError> {
    serde_yaml::from_str(CATALOGUE)
        .map_err(|e| {
            TransformError::InvalidArgs(format!("Failed to parse transform catalogue: {}", e))
        })
}

/// Loader for a built-in transform.
pub fn factory(name: &str) -> Option<Loader> {
    match name {
        "dnsResolve" => Some(loader(|| Arc::new(dns::DnsResolve))),
        "echo" => Some(loader(|| Arc::new(builtin::echo))),
        "nop" => Some(loader(|| Arc::new(builtin::nop))),
        _ => None,
    }
}

fn loader<F>(make: F) -> Loader
where
    F: Fn() -> Arc<dyn Transform> + Send + Sync + 'static,
{
    Arc::new(move || -> Result<Arc<dyn Transform>, TransformError> { Ok(make()) })
}

/// Registry holding every built-in transform.
pub fn builtin_registry() -> Result<TransformRegistry, TransformError> {
    let mut registry = TransformRegistry::new();

    for (name, meta) in catalogue()? {
        let loader = factory(&name).ok_or_else(|| TransformError::LoadFailed {
            name: name.clone(),
            reason: "no implementation linked for catalogue entry".to_string(),
        })?;
        registry.register(TransformDescriptor::new(name, meta, loader));
    }

    Ok(registry)
}
