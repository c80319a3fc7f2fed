//! Record addressing
//!
//! A record is addressed by the triple `(namespace, set, user key)`.
//! The namespace comes from configuration, the set from the entity
//! descriptor, and the user key from the entity's identifier field.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier part of a record key
///
/// Only integers, strings and byte blobs can address a record. Unlike
/// `Value`, this type is `Eq + Hash + Ord` so it can index a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserKey {
    /// Integer identifier
    Int(i64),
    /// String identifier
    String(String),
    /// Binary identifier
    Bytes(Vec<u8>),
}

impl UserKey {
    /// Convert a generic value into a user key
    ///
    /// Returns `None` for values that cannot address a record
    /// (null, floats, booleans, collections and records).
    pub fn from_value(value: &Value) -> Option<UserKey> {
        match value {
            Value::Int(i) => Some(UserKey::Int(*i)),
            Value::String(s) => Some(UserKey::String(s.clone())),
            Value::Bytes(b) => Some(UserKey::Bytes(b.clone())),
            _ => None,
        }
    }

    /// Convert back into the generic value model
    pub fn to_value(&self) -> Value {
        match self {
            UserKey::Int(i) => Value::Int(*i),
            UserKey::String(s) => Value::String(s.clone()),
            UserKey::Bytes(b) => Value::Bytes(b.clone()),
        }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserKey::Int(i) => write!(f, "{}", i),
            UserKey::String(s) => write!(f, "{}", s),
            UserKey::Bytes(b) => write!(f, "0x{}", hex(b)),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl From<&str> for UserKey {
    fn from(s: &str) -> Self {
        UserKey::String(s.to_string())
    }
}

impl From<String> for UserKey {
    fn from(s: String) -> Self {
        UserKey::String(s)
    }
}

impl From<i64> for UserKey {
    fn from(i: i64) -> Self {
        UserKey::Int(i)
    }
}

impl From<Vec<u8>> for UserKey {
    fn from(b: Vec<u8>) -> Self {
        UserKey::Bytes(b)
    }
}

/// Full record key: namespace, set name and user key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    /// Namespace (storage-level partition)
    pub namespace: String,
    /// Set name (table-like grouping inside a namespace)
    pub set_name: String,
    /// Record identifier
    pub user_key: UserKey,
}

impl Key {
    /// Create a new key
    pub fn new(
        namespace: impl Into<String>,
        set_name: impl Into<String>,
        user_key: impl Into<UserKey>,
    ) -> Self {
        Key {
            namespace: namespace.into(),
            set_name: set_name.into(),
            user_key: user_key.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.set_name, self.user_key)
    }
}
