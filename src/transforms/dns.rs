//! DNS resolution through the system resolver.

use async_trait::async_trait;
use indexmap::IndexSet;
use std::net::IpAddr;

use crate::node::Node;
use crate::options::BoundOptions;
use crate::transform_registry::{Transform, TransformError, TransformOutput};

/// Node type of resolved addresses.
pub const IP_TYPE: &str = "ip";

/// Address family filter for the `family` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Any,
    V4,
    V6,
}

impl Family {
    pub fn parse(raw: &str) -> Result<Self, TransformError> {
        match raw.trim().to_lowercase().as_str() {
            "" | "any" => Ok(Family::Any),
            "ipv4" | "v4" | "4" => Ok(Family::V4),
            "ipv6" | "v6" | "6" => Ok(Family::V6),
            other => Err(TransformError::InvalidArgs(format!(
                "unknown address family '{}' (expected any, ipv4 or ipv6)",
                other
            ))),
        }
    }

    pub fn admits(&self, ip: &IpAddr) -> bool {
        match self {
            Family::Any => true,
            Family::V4 => ip.is_ipv4(),
            Family::V6 => ip.is_ipv6(),
        }
    }
}

fn family_name(ip: &IpAddr) -> &'static str {
    if ip.is_ipv4() {
        "ipv4"
    } else {
        "ipv6"
    }
}

/// Resolves the node label to addresses and links one `ip` node per address.
pub struct DnsResolve;

#[async_trait]
impl Transform for DnsResolve {
    async fn run(
        &self,
        node: &Node,
        options: &BoundOptions,
    ) -> Result<TransformOutput, TransformError> {
        let family = Family::parse(options.get_str("family").unwrap_or("any"))?;

        let host = node.label().trim().trim_end_matches('.');
        if host.is_empty() {
            return Err(TransformError::InvalidArgs("empty host name".to_string()));
        }

        let addrs = tokio::net::lookup_host((host, 0)).await.map_err(|e| {
            TransformError::ExecutionError(format!("lookup of {} failed: {}", host, e))
        })?;

        let ips: IndexSet<IpAddr> = addrs.map(|a| a.ip()).filter(|ip| family.admits(ip)).collect();
        tracing::debug!("{} resolved to {} addresses", host, ips.len());

        let mut output = TransformOutput::new();
        for ip in ips {
            let text = ip.to_string();
            output.link(
                node.id(),
                Node::new(IP_TYPE, text.clone())
                    .with_prop("ip", text)
                    .with_prop("family", family_name(&ip)),
            );
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PropValue;
    use crate::options::{bind, OptionKind, OptionSchema, OptionSpec};
    use std::collections::HashMap;

    fn options(family: &str) -> BoundOptions {
        let mut schema = OptionSchema::new();
        schema.insert(
            "family".to_string(),
            OptionSpec {
                description: String::new(),
                kind: OptionKind::String,
                default: Some(PropValue::from("any")),
            },
        );
        let mut raw = HashMap::new();
        raw.insert("family".to_string(), family.to_string());
        bind(&schema, &raw).0
    }

    #[test]
    fn test_family_parse() {
        assert_eq!(Family::parse("IPv4").unwrap(), Family::V4);
        assert_eq!(Family::parse("").unwrap(), Family::Any);
        assert!(matches!(Family::parse("ipx"), Err(TransformError::InvalidArgs(_))));
    }

    #[test]
    fn test_family_admits() {
        let v4: IpAddr = "10.0.0.1".parse().unwrap();
        let v6: IpAddr = "::1".parse().unwrap();

        assert!(Family::Any.admits(&v4) && Family::Any.admits(&v6));
        assert!(Family::V4.admits(&v4) && !Family::V4.admits(&v6));
        assert!(Family::V6.admits(&v6) && !Family::V6.admits(&v4));
    }

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let node = Node::new("domain", "127.0.0.1");

        let output = DnsResolve.run(&node, &options("any")).await.unwrap();

        assert_eq!(output.len(), 1);
        let ip = &output.nodes()[0];
        assert_eq!(ip.node_type(), IP_TYPE);
        assert_eq!(ip.label(), "127.0.0.1");
        assert_eq!(ip.prop("family"), Some(&PropValue::from("ipv4")));
    }

    #[tokio::test]
    async fn test_family_filter_drops_addresses() {
        let node = Node::new("domain", "127.0.0.1");

        let output = DnsResolve.run(&node, &options("ipv6")).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_bad_family_is_invalid_args() {
        let node = Node::new("domain", "127.0.0.1");

        let err = DnsResolve.run(&node, &options("ipx")).await.err().unwrap();
        assert!(matches!(err, TransformError::InvalidArgs(_)));
    }
}
