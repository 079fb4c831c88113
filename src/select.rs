//! Node selection by id or label.
//!
//! Matching is exact: a pattern selects a node when it equals the node id or
//! the node label. Regular expressions are opt-in, written between slashes
//! (`/\.example\.com$/`) and matched against the label.

use regex::Regex;

use crate::node::Node;

/// A parsed selection pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact match against id or label
    Exact(String),
    /// Regex match against label
    Regex(Regex),
}

impl Pattern {
    /// Parse a raw pattern. A `/.../` pattern that fails to compile is
    /// treated as an exact string instead of being rejected.
    pub fn parse(raw: &str) -> Self {
        if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
            match Regex::new(&raw[1..raw.len() - 1]) {
                Ok(re) => return Pattern::Regex(re),
                Err(e) => {
                    tracing::warn!("Invalid selection regex {}: {}; matching literally", raw, e);
                }
            }
        }
        Pattern::Exact(raw.to_string())
    }

    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Pattern::Exact(s) => node.label() == s || node.id().to_string() == *s,
            Pattern::Regex(re) => re.is_match(node.label()),
        }
    }
}

/// Select the nodes matching any of the patterns, preserving input order.
pub fn select<'a, I, S>(nodes: I, patterns: &[S]) -> Vec<&'a Node>
where
    I: IntoIterator<Item = &'a Node>,
    S: AsRef<str>,
{
    let patterns: Vec<Pattern> = patterns.iter().map(|p| Pattern::parse(p.as_ref())).collect();

    nodes
        .into_iter()
        .filter(|node| patterns.iter().any(|p| p.matches(node)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(nodes: &[&Node]) -> Vec<String> {
        nodes.iter().map(|n| n.label().to_string()).collect()
    }

    #[test]
    fn test_exact_label_match() {
        let graph = vec![Node::new("domain", "example.com"), Node::new("domain", "example.com.au")];

        let selected = select(&graph, &["example.com"]);
        assert_eq!(labels(&selected), vec!["example.com"]);

        let selected = select(&graph, &["example.com.au"]);
        assert_eq!(labels(&selected), vec!["example.com.au"]);
    }

    #[test]
    fn test_match_by_id() {
        let graph = vec![Node::new("ip", "10.0.0.1"), Node::new("ip", "10.0.0.2")];
        let id = graph[1].id().to_string();

        let selected = select(&graph, &[id]);
        assert_eq!(labels(&selected), vec!["10.0.0.2"]);
    }

    #[test]
    fn test_regex_opt_in() {
        let graph = vec![
            Node::new("domain", "example.com"),
            Node::new("domain", "example.com.au"),
            Node::new("domain", "other.org"),
        ];

        let selected = select(&graph, &["/^example\\./"]);
        assert_eq!(labels(&selected), vec!["example.com", "example.com.au"]);
    }

    #[test]
    fn test_preserves_graph_order() {
        let graph = vec![
            Node::new("domain", "b"),
            Node::new("domain", "a"),
            Node::new("domain", "c"),
        ];

        let selected = select(&graph, &["c", "b"]);
        assert_eq!(labels(&selected), vec!["b", "c"]);
    }

    #[test]
    fn test_invalid_regex_matches_literally() {
        let graph = vec![Node::new("string", "/[/")];
        assert_eq!(select(&graph, &["/[/"]).len(), 1);
    }

    #[test]
    fn test_no_match_is_empty() {
        let graph = vec![Node::new("domain", "example.com")];
        assert!(select(&graph, &["nothing"]).is_empty());
    }
}
