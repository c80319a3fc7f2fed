//! Value types for recmap
//!
//! This module defines:
//! - Value: Unified enum for everything storable in a record bin
//! - NestedRecord: A typed object embedded inside a bin value
//!
//! ## Canonical Value Model
//!
//! The Value enum has exactly 9 variants:
//! - Null, Bool, Int, Float, String, Bytes, List, Map, Record
//!
//! ### Type Rules
//!
//! - No implicit type coercions: `Int(1) != Float(1.0)`
//! - `Bytes` are not `String`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`
//! - Map and Record equality ignore entry order
//! - Values never form cycles; the source object graph is a DAG

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical value type for record bins
///
/// Every field of a mapped entity is converted into one of these variants
/// before it is handed to a storage client, and every bin read back from a
/// storage client is decoded from one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value (absent)
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes, a first-class scalar distinct from `String`
    Bytes(Vec<u8>),
    /// Ordered list of values
    List(Vec<Value>),
    /// Map with arbitrary value keys, insertion ordered
    Map(Vec<(Value, Value)>),
    /// Nested typed object carrying its type discriminator
    Record(NestedRecord),
}

/// A typed object stored inside a bin
///
/// `type_tag` is the discriminator used to pick the concrete descriptor when
/// the value is read back into a polymorphic field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedRecord {
    /// Type discriminator, `None` for untyped maps
    pub type_tag: Option<String>,
    /// Field name to value
    pub fields: BTreeMap<String, Value>,
}

impl NestedRecord {
    /// Create an empty record with the given discriminator
    pub fn new(type_tag: impl Into<String>) -> Self {
        NestedRecord {
            type_tag: Some(type_tag.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Create an empty record with no discriminator
    pub fn untyped() -> Self {
        NestedRecord::default()
    }

    /// Builder-style field insertion
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

// Custom PartialEq implementation for IEEE-754 float semantics
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // IEEE-754: NaN != NaN, -0.0 == 0.0
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => map_entries_eq(a, b),
            (Value::Record(a), Value::Record(b)) => a == b,
            // Different types are never equal
            _ => false,
        }
    }
}

/// Order-insensitive entry comparison; each entry of `b` matches at most once
fn map_entries_eq(a: &[(Value, Value)], b: &[(Value, Value)]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|(k, v)| {
        let found = b
            .iter()
            .enumerate()
            .find(|(i, (bk, bv))| !used[*i] && bk == k && bv == v)
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Record(_) => "Record",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[u8] if this is a Bytes value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get as &[Value] if this is a List value
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    /// Get map entries if this is a Map value
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Get as &NestedRecord if this is a Record value
    pub fn as_record(&self) -> Option<&NestedRecord> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Look up a map entry by key
    pub fn map_get(&self, key: &Value) -> Option<&Value> {
        self.as_map()
            .and_then(|entries| entries.iter().find(|(k, _)| k == key).map(|(_, v)| v))
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<NestedRecord> for Value {
    fn from(r: NestedRecord) -> Self {
        Value::Record(r)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}
