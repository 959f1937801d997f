//! Manifest document tree
//!
//! Manifests are parsed with `serde_yaml` and converted into a small tagged
//! tree. Schema walking, entry decoding and placeholder rewriting all operate
//! on [`Node`], never on the parser's own value type.

use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

use crate::error::ManifestError;

/// A leaf value of the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Render the scalar as text, as used for ids and file names.
    ///
    /// Returns `None` for null.
    pub fn render(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::String(s) => Some(s.clone()),
        }
    }
}

/// A node of the manifest tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    /// String-keyed mapping. Key order is irrelevant.
    Mapping(BTreeMap<String, Node>),
    /// Ordered sequence.
    Sequence(Vec<Node>),
    /// Leaf value.
    Scalar(Scalar),
}

impl Node {
    /// Parse a YAML document into a tree.
    ///
    /// An empty document yields a null scalar.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let value: Value = serde_yaml::from_str(text)?;
        Ok(Self::from(value))
    }

    /// Null scalar.
    pub fn null() -> Self {
        Node::Scalar(Scalar::Null)
    }

    /// String scalar.
    pub fn string(s: impl Into<String>) -> Self {
        Node::Scalar(Scalar::String(s.into()))
    }

    /// Look up a key, if this node is a mapping.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Scalar(Scalar::Null))
    }

    /// Short name of the node's shape, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Mapping(_) => "mapping",
            Node::Sequence(_) => "sequence",
            Node::Scalar(Scalar::Null) => "null",
            Node::Scalar(_) => "scalar",
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Scalar(Scalar::Null),
            Value::Bool(b) => Node::Scalar(Scalar::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Scalar(Scalar::Int(i))
                } else {
                    // u64 beyond i64::MAX, or a real float
                    Node::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Value::String(s) => Node::Scalar(Scalar::String(s)),
            Value::Sequence(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Mapping(map) => Node::Mapping(
                map.into_iter()
                    .map(|(k, v)| (key_to_string(k), Node::from(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => Node::from(tagged.value),
        }
    }
}

/// Stringify a YAML mapping key.
fn key_to_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Tagged(tagged) => key_to_string(tagged.value),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
