//! Canonical key strings for primary keys and composed-child identities.
//!
//! Keys serialize to compact JSON arrays, so equality and ordering of key
//! strings are deterministic regardless of arrival order or platform.
//! Non-ASCII characters are emitted literally; embedded quotes and
//! backslashes follow JSON escaping.

use mmg_model::instance::{CanonicalKey, KeyValue};
use serde_json::Value;
use thiserror::Error;

/// Failures constructing or parsing composed-key strings.
///
/// These are validation errors on caller-supplied arguments and return as
/// values; they never become data diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("parent key must not be empty")]
    EmptyParentKey,
    #[error("composition name must not be empty")]
    EmptyName,
    #[error("child key must not be empty")]
    EmptyChildKey,
    #[error("child index must be an exact non-negative integer")]
    InvalidIndex,
    #[error("composed key must have 2 or 3 elements, found {0}")]
    WrongArity(usize),
    #[error("parent key must be a JSON array")]
    ParentNotArray,
    #[error("composition name must be a JSON string")]
    NameNotString,
    #[error("child element must be a key array or an integer index")]
    InvalidChild,
    #[error("key components must be JSON scalars")]
    NonScalarComponent,
    #[error("malformed composed key: {0}")]
    Malformed(String),
}

/// Identity of a composed child within its parent and relation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildSelector {
    /// Child of a primary-keyed type: its canonical key.
    Key(CanonicalKey),
    /// Child of a key-less type: zero-based position under the relation.
    Index(u64),
}

/// Structured form of a parsed composed key.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedKey {
    pub parent_key: CanonicalKey,
    pub relation: String,
    /// `None` for one-cardinality compositions.
    pub child: Option<ChildSelector>,
}

/// Canonical JSON-array form of a primary key. An empty key yields `[]`.
pub fn format_key(values: &[KeyValue]) -> String {
    Value::Array(values.iter().map(scalar_value).collect()).to_string()
}

/// Canonical form of a composed-child identity:
/// `[ParentKey,"Name"]` for one-cardinality, `[ParentKey,"Name",ChildKey]`
/// for many with a primary key, `[ParentKey,"Name",Index]` for many
/// without one.
pub fn format_composed_key(
    parent_key: &[KeyValue],
    relation: &str,
    child: Option<&ChildSelector>,
) -> Result<String, KeyError> {
    if parent_key.is_empty() {
        return Err(KeyError::EmptyParentKey);
    }
    if relation.is_empty() {
        return Err(KeyError::EmptyName);
    }

    let mut elements = vec![
        Value::Array(parent_key.iter().map(scalar_value).collect()),
        Value::String(relation.to_string()),
    ];
    match child {
        None => {}
        Some(ChildSelector::Key(key)) => {
            if key.is_empty() {
                return Err(KeyError::EmptyChildKey);
            }
            elements.push(Value::Array(key.iter().map(scalar_value).collect()));
        }
        Some(ChildSelector::Index(index)) => elements.push(Value::from(*index)),
    }
    Ok(Value::Array(elements).to_string())
}

/// Inverse of [`format_composed_key`].
///
/// Integer parent components parse back as exact integers; only values
/// outside the `i64` range degrade to floats. Indexes must be exact
/// non-negative integers.
pub fn parse_composed_key(s: &str) -> Result<ComposedKey, KeyError> {
    let value: Value = serde_json::from_str(s).map_err(|e| KeyError::Malformed(e.to_string()))?;
    let Value::Array(elements) = value else {
        return Err(KeyError::Malformed("expected a JSON array".to_string()));
    };
    if elements.len() != 2 && elements.len() != 3 {
        return Err(KeyError::WrongArity(elements.len()));
    }

    let mut elements = elements.into_iter();
    let parent_key = match elements.next() {
        Some(Value::Array(components)) => components
            .into_iter()
            .map(scalar_component)
            .collect::<Result<CanonicalKey, _>>()?,
        _ => return Err(KeyError::ParentNotArray),
    };
    let relation = match elements.next() {
        Some(Value::String(name)) if !name.is_empty() => name,
        Some(Value::String(_)) => return Err(KeyError::EmptyName),
        _ => return Err(KeyError::NameNotString),
    };
    let child = match elements.next() {
        None => None,
        Some(Value::Array(components)) => {
            if components.is_empty() {
                return Err(KeyError::EmptyChildKey);
            }
            Some(ChildSelector::Key(
                components
                    .into_iter()
                    .map(scalar_component)
                    .collect::<Result<CanonicalKey, _>>()?,
            ))
        }
        Some(Value::Number(n)) => Some(ChildSelector::Index(
            n.as_u64().ok_or(KeyError::InvalidIndex)?,
        )),
        Some(_) => return Err(KeyError::InvalidChild),
    };

    Ok(ComposedKey {
        parent_key,
        relation,
        child,
    })
}

fn scalar_value(value: &KeyValue) -> Value {
    match value {
        KeyValue::Str(s) => Value::String(s.clone()),
        KeyValue::Int(i) => Value::from(*i),
        // Non-finite floats have no JSON form and render as null.
        KeyValue::Float(x) => serde_json::Number::from_f64(*x).map_or(Value::Null, Value::Number),
        KeyValue::Bool(b) => Value::Bool(*b),
        KeyValue::Null => Value::Null,
    }
}

fn scalar_component(value: Value) -> Result<KeyValue, KeyError> {
    match value {
        Value::String(s) => Ok(KeyValue::Str(s)),
        Value::Number(n) => n
            .as_i64()
            .map(KeyValue::Int)
            .or_else(|| n.as_f64().map(KeyValue::Float))
            .ok_or(KeyError::NonScalarComponent),
        Value::Bool(b) => Ok(KeyValue::Bool(b)),
        Value::Null => Ok(KeyValue::Null),
        Value::Array(_) | Value::Object(_) => Err(KeyError::NonScalarComponent),
    }
}
