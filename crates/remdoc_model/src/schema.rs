//! Schema nodes and canonicalization.
//!
//! A schema is a tree of [`Node`]s. Canonicalizing a raw JSON value against
//! a node is total: values of the wrong shape are replaced by the node's
//! default, so the output always has the declared shape.

use remdoc_protocol::Scalar;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An index value: one scalar or a sequence of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    /// A single value.
    One(Scalar),
    /// Several values, matched individually by the store.
    Many(Vec<Scalar>),
}

impl IndexValue {
    /// Returns the value as JSON.
    pub fn to_json(&self) -> Value {
        match self {
            IndexValue::One(scalar) => scalar.to_json(),
            IndexValue::Many(items) => Value::Array(items.iter().map(Scalar::to_json).collect()),
        }
    }

    /// Reads an index value from JSON. Arrays must hold only scalars.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(Scalar::from_json)
                .collect::<Option<Vec<_>>>()
                .map(IndexValue::Many),
            other => Scalar::from_json(other).map(IndexValue::One),
        }
    }
}

impl From<Scalar> for IndexValue {
    fn from(value: Scalar) -> Self {
        IndexValue::One(value)
    }
}

macro_rules! index_value_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for IndexValue {
                fn from(value: $ty) -> Self {
                    IndexValue::One(Scalar::from(value))
                }
            }
        )*
    };
}

index_value_from!(&str, String, i64, i32, f64);

/// Index name to value, ordered by name.
pub type Indexes = BTreeMap<String, IndexValue>;

/// Computes `(index name, value)` pairs from a canonical value.
pub type IndexFn = Arc<dyn Fn(&Value) -> Vec<(String, IndexValue)> + Send + Sync>;

/// The shape of a node and its default.
#[derive(Clone)]
pub enum NodeKind {
    /// Text.
    Str {
        /// Value used when the input is not a string.
        default: String,
    },
    /// Number.
    Num {
        /// Value used when the input is not a number.
        default: Number,
    },
    /// Boolean.
    Bool {
        /// Value used when the input is not a boolean.
        default: bool,
    },
    /// Object with declared fields, in declaration order.
    Dict {
        /// Field name and node.
        fields: Vec<(String, Node)>,
    },
    /// Sequence of values shaped like `item`.
    List {
        /// Template for every element.
        item: Box<Node>,
        /// Elements used when the input is not an array.
        default: Vec<Value>,
    },
}

/// A schema node: a shape, a default and an optional index extractor.
#[derive(Clone)]
pub struct Node {
    kind: NodeKind,
    index: Option<IndexFn>,
}

impl Node {
    fn of(kind: NodeKind) -> Self {
        Self { kind, index: None }
    }

    /// A string defaulting to `""`.
    pub fn string() -> Self {
        Self::string_or("")
    }

    /// A string with a default.
    pub fn string_or(default: impl Into<String>) -> Self {
        Self::of(NodeKind::Str {
            default: default.into(),
        })
    }

    /// A number defaulting to `0`.
    pub fn number() -> Self {
        Self::of(NodeKind::Num {
            default: Number::from(0),
        })
    }

    /// A number with a default. Non-finite defaults become `0`.
    pub fn number_or(default: f64) -> Self {
        let default = if default.fract() == 0.0 && default.abs() < i64::MAX as f64 {
            Number::from(default as i64)
        } else {
            Number::from_f64(default).unwrap_or_else(|| Number::from(0))
        };
        Self::of(NodeKind::Num { default })
    }

    /// A boolean defaulting to `false`.
    pub fn boolean() -> Self {
        Self::boolean_or(false)
    }

    /// A boolean with a default.
    pub fn boolean_or(default: bool) -> Self {
        Self::of(NodeKind::Bool { default })
    }

    /// An object with the given fields.
    pub fn dict<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, Node)>,
        S: Into<String>,
    {
        Self::of(NodeKind::Dict {
            fields: fields.into_iter().map(|(n, node)| (n.into(), node)).collect(),
        })
    }

    /// A list of `item` with no default elements.
    pub fn list(item: Node) -> Self {
        Self::list_or(item, Vec::new())
    }

    /// A list of `item` with default elements.
    pub fn list_or(item: Node, default: Vec<Value>) -> Self {
        Self::of(NodeKind::List {
            item: Box::new(item),
            default,
        })
    }

    /// Attaches an index extractor, replacing any previous one.
    pub fn indexed<F>(mut self, extract: F) -> Self
    where
        F: Fn(&Value) -> Vec<(String, IndexValue)> + Send + Sync + 'static,
    {
        self.index = Some(Arc::new(extract));
        self
    }

    /// Indexes the node's own value under `name`.
    ///
    /// Strings and numbers index as one value, lists of them as many.
    /// Other values produce no entry.
    pub fn index_as(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.indexed(move |value| match IndexValue::from_json(value) {
            Some(index) => vec![(name.clone(), index)],
            None => Vec::new(),
        })
    }

    /// Returns the node's shape.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Returns the canonical default value.
    pub fn default_value(&self) -> Value {
        self.canonicalize(None, &mut Indexes::new())
    }

    /// Canonicalizes `raw` against this node, recording index entries.
    ///
    /// `None` stands for an absent value.
    pub fn canonicalize(&self, raw: Option<&Value>, indexes: &mut Indexes) -> Value {
        let value = match &self.kind {
            NodeKind::Str { default } => match raw {
                Some(Value::String(s)) => Value::String(s.clone()),
                _ => Value::String(default.clone()),
            },
            NodeKind::Num { default } => match raw {
                Some(Value::Number(n)) => Value::Number(n.clone()),
                _ => Value::Number(default.clone()),
            },
            NodeKind::Bool { default } => match raw {
                Some(Value::Bool(b)) => Value::Bool(*b),
                _ => Value::Bool(*default),
            },
            NodeKind::Dict { fields } => {
                let source = raw.and_then(Value::as_object);
                let mut out = Map::new();
                for (name, node) in fields {
                    let child = node.canonicalize(source.and_then(|m| m.get(name)), indexes);
                    out.insert(name.clone(), child);
                }
                Value::Object(out)
            }
            NodeKind::List { item, default } => {
                let source = match raw {
                    Some(Value::Array(items)) => items.as_slice(),
                    _ => default.as_slice(),
                };
                let mut out: Vec<Value> = source
                    .iter()
                    .map(|element| item.canonicalize(Some(element), indexes))
                    .collect();
                if out.is_empty() {
                    out.push(item.canonicalize(None, indexes));
                }
                Value::Array(out)
            }
        };

        if let Some(extract) = &self.index {
            for (name, index) in extract(&value) {
                indexes.insert(name, index);
            }
        }
        value
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Node");
        match &self.kind {
            NodeKind::Str { default } => out.field("string", default),
            NodeKind::Num { default } => out.field("number", default),
            NodeKind::Bool { default } => out.field("boolean", default),
            NodeKind::Dict { fields } => out.field("dict", fields),
            NodeKind::List { item, default } => out.field("list", item).field("default", default),
        };
        out.field("indexed", &self.index.is_some()).finish()
    }
}
