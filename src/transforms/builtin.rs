//! Transforms that need no external data source.

use crate::node::Node;
use crate::options::BoundOptions;
use crate::transform_registry::{TransformError, TransformOutput};

/// Does not do anything.
pub fn nop(_node: &Node, _options: &BoundOptions) -> Result<TransformOutput, TransformError> {
    Ok(TransformOutput::new())
}

/// Emits a copy of the input node, linked from it.
pub fn echo(node: &Node, _options: &BoundOptions) -> Result<TransformOutput, TransformError> {
    let mut output = TransformOutput::new();
    output.link(
        node.id(),
        Node::with_props(node.node_type(), node.label(), node.props().clone()),
    );
    Ok(output)
}
