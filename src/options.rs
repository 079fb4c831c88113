//! Transform option schemas and lenient binding of string-typed input.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::node::PropValue;

/// Declared value type of an option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    #[default]
    String,
    Boolean,
    Number,
}

impl OptionKind {
    /// Coerce raw CLI text to this kind.
    pub fn coerce(&self, raw: &str) -> Option<PropValue> {
        match self {
            OptionKind::String => Some(PropValue::String(raw.to_string())),
            OptionKind::Boolean => match raw.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(PropValue::Bool(true)),
                "false" | "no" | "off" | "0" | "" => Some(PropValue::Bool(false)),
                _ => None,
            },
            OptionKind::Number => {
                let raw = raw.trim();
                raw.parse::<i64>()
                    .map(PropValue::Int)
                    .or_else(|_| raw.parse::<f64>().map(PropValue::Float))
                    .ok()
            }
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::String => write!(f, "string"),
            OptionKind::Boolean => write!(f, "boolean"),
            OptionKind::Number => write!(f, "number"),
        }
    }
}

/// One declared option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionSpec {
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: OptionKind,
    #[serde(default)]
    pub default: Option<PropValue>,
}

/// Option name -> declaration, in declaration order.
pub type OptionSchema = IndexMap<String, OptionSpec>;

/// Non-fatal problem found while binding options.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionWarning {
    /// The option is not declared by the transform; it was dropped.
    Unknown { name: String },
    /// The value could not be coerced; the default was used instead.
    Mistyped {
        name: String,
        value: String,
        expected: OptionKind,
    },
}

impl fmt::Display for OptionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionWarning::Unknown { name } => write!(f, "Unknown option '{}' ignored", name),
            OptionWarning::Mistyped { name, value, expected } => write!(
                f,
                "Option '{}' expects a {} value, got '{}'; using default",
                name, expected, value
            ),
        }
    }
}

/// Option values after binding against a schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundOptions {
    values: IndexMap<String, PropValue>,
}

impl BoundOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(|v| v.as_bool())
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(|v| v.as_f64())
    }
}

/// Bind raw option strings against `schema`.
///
/// Unknown keys are dropped, missing keys take the declared default and
/// values that cannot be coerced fall back to the default. Never fails.
pub fn bind(
    schema: &OptionSchema,
    raw: &HashMap<String, String>,
) -> (BoundOptions, Vec<OptionWarning>) {
    let mut warnings = Vec::new();

    let mut unknown: Vec<&String> = raw.keys().filter(|k| !schema.contains_key(*k)).collect();
    unknown.sort();
    for name in unknown {
        warnings.push(OptionWarning::Unknown { name: name.clone() });
    }

    let mut values = IndexMap::new();
    for (name, spec) in schema {
        let coerced = match raw.get(name) {
            Some(value) => match spec.kind.coerce(value) {
                Some(v) => Some(v),
                None => {
                    warnings.push(OptionWarning::Mistyped {
                        name: name.clone(),
                        value: value.clone(),
                        expected: spec.kind,
                    });
                    None
                }
            },
            None => None,
        };

        if let Some(value) = coerced.or_else(|| spec.default.clone()) {
            values.insert(name.clone(), value);
        }
    }

    (BoundOptions { values }, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> OptionSchema {
        let mut schema = OptionSchema::new();
        schema.insert(
            "type".to_string(),
            OptionSpec {
                description: "Record type".to_string(),
                kind: OptionKind::String,
                default: Some(PropValue::from("A")),
            },
        );
        schema.insert(
            "limit".to_string(),
            OptionSpec {
                description: "Maximum results".to_string(),
                kind: OptionKind::Number,
                default: Some(PropValue::Int(100)),
            },
        );
        schema.insert(
            "verbose".to_string(),
            OptionSpec {
                description: "Verbose output".to_string(),
                kind: OptionKind::Boolean,
                default: None,
            },
        );
        schema
    }

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_missing_options_take_defaults() {
        let (bound, warnings) = bind(&schema(), &HashMap::new());

        assert!(warnings.is_empty());
        assert_eq!(bound.get_str("type"), Some("A"));
        assert_eq!(bound.get("limit"), Some(&PropValue::Int(100)));
        assert_eq!(bound.get("verbose"), None);
    }

    #[test]
    fn test_values_are_coerced() {
        let raw = raw(&[("type", "MX"), ("limit", "5"), ("verbose", "yes")]);
        let (bound, warnings) = bind(&schema(), &raw);

        assert!(warnings.is_empty());
        assert_eq!(bound.get_str("type"), Some("MX"));
        assert_eq!(bound.get_f64("limit"), Some(5.0));
        assert_eq!(bound.get_bool("verbose"), Some(true));
    }

    #[test]
    fn test_unknown_options_dropped() {
        let (bound, warnings) = bind(&schema(), &raw(&[("colour", "blue")]));

        assert_eq!(bound.get("colour"), None);
        assert_eq!(warnings, vec![OptionWarning::Unknown { name: "colour".to_string() }]);
    }

    #[test]
    fn test_mistyped_value_falls_back_to_default() {
        let (bound, warnings) = bind(&schema(), &raw(&[("limit", "lots")]));

        assert_eq!(bound.get("limit"), Some(&PropValue::Int(100)));
        assert_eq!(warnings.len(), 1);
        assert!(matches!(&warnings[0], OptionWarning::Mistyped { name, .. } if name == "limit"));
    }

    #[test]
    fn test_option_spec_from_yaml() {
        let yaml = r#"
description: Record type
type: string
default: A
"#;
        let spec: OptionSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.kind, OptionKind::String);
        assert_eq!(spec.default, Some(PropValue::from("A")));
    }
}
