//! Narrow record operations
//!
//! Operations are applied atomically by a storage client in a single
//! round trip (`operate`). Read operations return bins as they are after
//! the write operations earlier in the same list.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A single operation inside an `operate` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Overwrite a bin
    Put {
        /// Bin name
        bin: String,
        /// New value
        value: Value,
    },
    /// Add to an integer bin (missing bins start at zero)
    Add {
        /// Bin name
        bin: String,
        /// Increment
        delta: i64,
    },
    /// Append to a string bin (missing bins start empty)
    Append {
        /// Bin name
        bin: String,
        /// Suffix
        suffix: String,
    },
    /// Prepend to a string bin (missing bins start empty)
    Prepend {
        /// Bin name
        bin: String,
        /// Prefix
        prefix: String,
    },
    /// Reset the record's time-to-live to the policy expiration
    Touch,
    /// Read a single bin
    Get {
        /// Bin name
        bin: String,
    },
    /// Read all bins
    GetAll,
    /// Read generation and expiration only
    GetHeader,
}

impl Operation {
    /// Create a `Put` operation
    pub fn put(bin: impl Into<String>, value: impl Into<Value>) -> Self {
        Operation::Put {
            bin: bin.into(),
            value: value.into(),
        }
    }

    /// Create an `Add` operation
    pub fn add(bin: impl Into<String>, delta: i64) -> Self {
        Operation::Add {
            bin: bin.into(),
            delta,
        }
    }

    /// Create an `Append` operation
    pub fn append(bin: impl Into<String>, suffix: impl Into<String>) -> Self {
        Operation::Append {
            bin: bin.into(),
            suffix: suffix.into(),
        }
    }

    /// Create a `Prepend` operation
    pub fn prepend(bin: impl Into<String>, prefix: impl Into<String>) -> Self {
        Operation::Prepend {
            bin: bin.into(),
            prefix: prefix.into(),
        }
    }

    /// Create a single-bin `Get` operation
    pub fn get(bin: impl Into<String>) -> Self {
        Operation::Get { bin: bin.into() }
    }

    /// Whether this operation mutates the record
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Put { .. }
                | Operation::Add { .. }
                | Operation::Append { .. }
                | Operation::Prepend { .. }
                | Operation::Touch
        )
    }

    /// Bin targeted by this operation, if any
    pub fn bin(&self) -> Option<&str> {
        match self {
            Operation::Put { bin, .. }
            | Operation::Add { bin, .. }
            | Operation::Append { bin, .. }
            | Operation::Prepend { bin, .. }
            | Operation::Get { bin } => Some(bin),
            Operation::Touch | Operation::GetAll | Operation::GetHeader => None,
        }
    }
}
