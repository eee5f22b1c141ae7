//! The untyped record model the engine validates against.
//!
//! Records are dynamically shaped mappings, not a fixed schema: nested mappings
//! are traversed by dotted field paths, arrays are indexed by numeric segments,
//! and a missing path segment yields [`Value::Undefined`] rather than an error —
//! helpers decide for themselves whether undefined is acceptable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single node in the record tree.
///
/// `Undefined` is distinct from `Null`: `Null` is a value a caller supplied,
/// `Undefined` is what the [`crate::extractor`] hands back when a path segment
/// doesn't resolve. Helpers are free to treat the two differently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    #[serde(skip)]
    Undefined,
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Index a single path segment: named field on an object, or numeric index
    /// into an array. Any other shape, or a missing key/out-of-range index,
    /// yields [`Value::Undefined`].
    pub fn get_segment(&self, segment: &str) -> Value {
        match self {
            Value::Object(map) => map.get(segment).cloned().unwrap_or(Value::Undefined),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(_) => write!(f, "[array]"),
            Value::Object(_) => write!(f, "[object]"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A record under validation: an unordered mapping from string keys to
/// arbitrary nested values. Thin newtype over [`Value::Object`]'s backing map
/// so the engine can require "a mapping" without dragging the whole `Value`
/// union through every signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record(IndexMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(IndexMap::new())
    }

    pub fn from_map(map: IndexMap<String, Value>) -> Self {
        Record(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Build a `Record` from an arbitrary `Value`, failing if it is not an
    /// object mapping. This is the `InvalidInput` boundary check of §7.
    pub fn from_value(value: Value) -> Result<Record, Value> {
        match value {
            Value::Object(map) => Ok(Record(map)),
            other => Err(other),
        }
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_distinct_from_null() {
        assert!(!Value::Null.is_undefined());
        assert!(Value::Undefined.is_undefined());
        assert_ne!(Value::Null, Value::Undefined);
    }

    #[test]
    fn get_segment_missing_object_key_is_undefined() {
        let mut map = IndexMap::new();
        map.insert("a".to_string(), Value::Number(1.0));
        let obj = Value::Object(map);
        assert_eq!(obj.get_segment("missing"), Value::Undefined);
        assert_eq!(obj.get_segment("a"), Value::Number(1.0));
    }

    #[test]
    fn get_segment_indexes_arrays_numerically() {
        let arr = Value::Array(vec![Value::from("x"), Value::from("y")]);
        assert_eq!(arr.get_segment("1"), Value::from("y"));
        assert_eq!(arr.get_segment("5"), Value::Undefined);
        assert_eq!(arr.get_segment("not-a-number"), Value::Undefined);
    }

    #[test]
    fn record_from_value_rejects_non_objects() {
        assert!(Record::from_value(Value::Array(vec![])).is_err());
        assert!(Record::from_value(Value::Object(IndexMap::new())).is_ok());
    }
}
