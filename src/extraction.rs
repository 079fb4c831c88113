//! Field addressing and the extraction pipeline.
//!
//! A [`FieldPath`] names one property of a node (`props.name` or just `name`),
//! optionally indexed into a list property (`props.emails.[0]`). A bare `id`,
//! `type` or `label` falls back to the node's own field when the node has no
//! property of that name. Extraction reads such a path from every output node
//! of a transform and decorates the result with a prefix and suffix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::node::Node;

/// Represents a path to a value on a node
///
/// # Examples
///
/// - `props.string` or `string` - the `string` property
/// - `label` - the `label` property, or the node label when there is none
/// - `type` - the `type` property, or the node type when there is none
/// - `emails.[1]` - second element of the `emails` list property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Parsed path segments
    pub segments: Vec<PathSegment>,
}

/// A segment in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field (e.g., "props", "resolved")
    Field(String),
    /// A list index (e.g., [0], [5])
    Index(usize),
}

impl FieldPath {
    /// Parse a field path with a given delimiter
    ///
    /// # Example
    ///
    /// ```
    /// use scout::FieldPath;
    ///
    /// let path = FieldPath::parse("props.emails.[0]", ".");
    /// assert_eq!(path.segments.len(), 3);
    /// ```
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let segments = path
            .split(delimiter)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('[') && s.ends_with(']') {
                    if let Ok(index) = s[1..s.len() - 1].parse::<usize>() {
                        return PathSegment::Index(index);
                    }
                }

                PathSegment::Field(s.to_string())
            })
            .collect();

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Create a field path from a dotted string
    pub fn from_dotted(path: &str) -> Self {
        Self::parse(path, ".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Trait for types that can extract values by field path
pub trait Extractor {
    /// Extract a value at the given field path
    ///
    /// Returns `Some(value)` if the path exists, `None` otherwise
    fn extract(&self, path: &FieldPath) -> Option<String>;
}

impl Extractor for Node {
    fn extract(&self, path: &FieldPath) -> Option<String> {
        let (name, rest) = match path.segments.as_slice() {
            [PathSegment::Field(head), PathSegment::Field(name), rest @ ..] if head == "props" => {
                (name, rest)
            }
            [PathSegment::Field(name), rest @ ..] => {
                if rest.is_empty() && self.prop(name).is_none() {
                    return intrinsic(self, name);
                }
                (name, rest)
            }
            _ => return None,
        };

        let value = self.prop(name)?;

        match rest {
            [] => Some(value.to_string()),
            [PathSegment::Index(index)] => value.as_list()?.get(*index).cloned(),
            _ => None,
        }
    }
}

/// Built-in node fields, read when no property of the same name exists.
fn intrinsic(node: &Node, name: &str) -> Option<String> {
    match name {
        "id" => Some(node.id().to_string()),
        "type" => Some(node.node_type().to_string()),
        "label" => Some(node.label().to_string()),
        _ => None,
    }
}

/// What to pull out of each output node, and how to decorate it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSpec {
    pub property: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

impl ExtractionSpec {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Extract the decorated value from one node. Missing fields read as "".
    pub fn extract_one(&self, node: &Node) -> String {
        let path = FieldPath::from_dotted(&self.property);
        self.decorate(node.extract(&path).unwrap_or_default())
    }

    /// Extract from every node, in order.
    pub fn apply<'a, I>(&self, nodes: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let path = FieldPath::from_dotted(&self.property);
        nodes
            .into_iter()
            .map(|node| self.decorate(node.extract(&path).unwrap_or_default()))
            .collect()
    }

    fn decorate(&self, value: String) -> String {
        format!("{}{}{}", self.prefix, value, self.suffix)
    }
}
