//! Non-destructive grouping of nodes by a derived key.

use indexmap::IndexMap;

use crate::extraction::{Extractor, FieldPath};
use crate::node::{Node, NodeId, PropValue, GROUP_TYPE};

/// Partition `nodes` by the value at `key` and build one `group` node per
/// distinct value.
///
/// Groups come out in first-appearance order of their key and each group's
/// `members` list keeps the input order. Nodes without a value at `key` land
/// in the group keyed by the empty string. The input nodes are not touched.
pub fn group<'a, I>(nodes: I, key: &FieldPath) -> Vec<Node>
where
    I: IntoIterator<Item = &'a Node>,
{
    let mut partitions: IndexMap<String, Vec<NodeId>> = IndexMap::new();

    for node in nodes {
        let value = node.extract(key).unwrap_or_default();
        partitions.entry(value).or_default().push(node.id());
    }

    partitions
        .into_iter()
        .map(|(value, members)| {
            let count = members.len() as i64;
            let members: Vec<String> = members.iter().map(|id| id.to_string()).collect();

            Node::new(GROUP_TYPE, value.clone())
                .with_prop("key", value)
                .with_prop("members", PropValue::List(members))
                .with_prop("count", count)
        })
        .collect()
}

/// Member ids recorded on a group node.
pub fn members(group: &Node) -> Vec<NodeId> {
    group
        .prop("members")
        .and_then(|v| v.as_list())
        .map(|ids| ids.iter().filter_map(|id| id.parse().ok()).collect())
        .unwrap_or_default()
}
