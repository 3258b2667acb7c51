//! Validated-instance model: keys, properties, edge data, composed values.

use crate::schema::TypeIdentity;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A primitive component of a primary key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Str(s) => write!(f, "{s:?}"),
            KeyValue::Int(i) => write!(f, "{i}"),
            KeyValue::Float(x) => write!(f, "{x}"),
            KeyValue::Bool(b) => write!(f, "{b}"),
            KeyValue::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for KeyValue {
    fn from(s: &str) -> Self {
        KeyValue::Str(s.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(s: String) -> Self {
        KeyValue::Str(s)
    }
}

impl From<i64> for KeyValue {
    fn from(i: i64) -> Self {
        KeyValue::Int(i)
    }
}

impl From<f64> for KeyValue {
    fn from(x: f64) -> Self {
        KeyValue::Float(x)
    }
}

impl From<bool> for KeyValue {
    fn from(b: bool) -> Self {
        KeyValue::Bool(b)
    }
}

/// Ordered primary-key components. Empty only for key-less composed parts.
pub type CanonicalKey = Vec<KeyValue>;

/// Instance properties, opaque to the graph. Always held behind `Arc` so
/// snapshot clones share the map by reference.
pub type PropertyMap = BTreeMap<String, serde_json::Value>;

/// One target entry of an association: the target's primary key plus
/// properties carried on the edge itself.
#[derive(Debug, Clone)]
pub struct EdgeData {
    pub target_key: CanonicalKey,
    pub properties: Arc<PropertyMap>,
}

impl EdgeData {
    pub fn new(target_key: CanonicalKey) -> Self {
        Self {
            target_key,
            properties: Arc::new(PropertyMap::new()),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        Arc::make_mut(&mut self.properties).insert(name.into(), value);
        self
    }
}

/// A composition slot as delivered at the API boundary.
#[derive(Debug, Clone)]
pub enum ComposedValue {
    /// The declared shape: an ordered sequence of children.
    Many(Vec<ValidatedInstance>),
    /// Defensive shape: a single child outside a sequence.
    One(Box<ValidatedInstance>),
}

impl ComposedValue {
    pub fn into_items(self) -> Vec<ValidatedInstance> {
        match self {
            ComposedValue::Many(items) => items,
            ComposedValue::One(item) => vec![*item],
        }
    }
}

/// Source location, 1-based lines and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            line,
            column,
            end_line,
            end_column,
        }
    }
}

/// Where an instance came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Identifier of the producing source (loader name, stream id, ...).
    pub source: String,
    pub path: String,
    pub span: Option<Span>,
}

impl Provenance {
    pub fn new(source: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// An instance that already passed schema validation. The graph trusts
/// its shape and never re-validates it.
#[derive(Debug, Clone)]
pub struct ValidatedInstance {
    pub type_tag: String,
    pub type_id: TypeIdentity,
    pub key: CanonicalKey,
    pub properties: Arc<PropertyMap>,
    /// Per-association edge data, keyed by relation name. A present entry
    /// with an empty list means the field appeared as an empty array.
    pub associations: BTreeMap<String, Vec<EdgeData>>,
    /// Per-composition children, keyed by relation name.
    pub compositions: BTreeMap<String, ComposedValue>,
    pub provenance: Option<Provenance>,
}

impl ValidatedInstance {
    pub fn new(type_id: TypeIdentity, key: CanonicalKey) -> Self {
        Self {
            type_tag: type_id.name.clone(),
            type_id,
            key,
            properties: Arc::new(PropertyMap::new()),
            associations: BTreeMap::new(),
            compositions: BTreeMap::new(),
            provenance: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.type_tag = tag.into();
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        Arc::make_mut(&mut self.properties).insert(name.into(), value);
        self
    }

    pub fn with_association(mut self, relation: impl Into<String>, entries: Vec<EdgeData>) -> Self {
        self.associations.insert(relation.into(), entries);
        self
    }

    pub fn with_composed(mut self, relation: impl Into<String>, value: ComposedValue) -> Self {
        self.compositions.insert(relation.into(), value);
        self
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }
}
