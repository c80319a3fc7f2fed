//! Write and read records
//!
//! - `WriteRecord`: created fresh by the converter for a single write call
//! - `ReadRecord`: what a storage client returns; consumed by the converter
//! - `WritePolicy`: storage-level preconditions attached to a write
//!
//! ## Version Policy
//!
//! | Policy | Store behavior |
//! |--------|----------------|
//! | `None` | Write unconditionally |
//! | `MustNotExist` | Fail with key-exists if the record is present |
//! | `MustExist` | Fail with not-found if the record is absent |
//! | `ExpectGeneration(n)` | Fail unless the record exists at generation `n` |

use crate::key::Key;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server-maintained write counter of a record
///
/// Incremented by the store on every successful write. Zero means the
/// record was never written.
pub type Generation = u32;

/// Bin name to value
pub type Bins = BTreeMap<String, Value>;

/// Record time-to-live requested by a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Expiration {
    /// Use the namespace default configured on the server
    #[default]
    ServerDefault,
    /// Never expire
    Never,
    /// Expire after the given number of seconds
    Seconds(u32),
}

impl Expiration {
    /// Build from a signed seconds value as used in mapping metadata
    ///
    /// `0` maps to the server default, negative values to never-expire.
    pub fn from_seconds(seconds: i64) -> Self {
        match seconds {
            0 => Expiration::ServerDefault,
            s if s < 0 => Expiration::Never,
            s => Expiration::Seconds(s.min(u32::MAX as i64) as u32),
        }
    }
}

/// Existence/generation precondition of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionPolicy {
    /// No precondition
    None,
    /// Record must currently be at this generation
    ExpectGeneration(Generation),
    /// Record must not exist
    MustNotExist,
    /// Record must exist
    MustExist,
}

/// How bins supplied by a write combine with bins already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BinMode {
    /// Stored bins are dropped; the record holds exactly the written bins
    #[default]
    Replace,
    /// Written bins are merged into the stored bins
    Merge,
}

/// Explicit record-exists action for custom persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordExistsAction {
    /// Create or merge
    Update,
    /// Merge into an existing record only
    UpdateOnly,
    /// Create or replace
    Replace,
    /// Replace an existing record only
    ReplaceOnly,
    /// Create only
    CreateOnly,
}

impl RecordExistsAction {
    /// Split into the version precondition and bin mode it implies
    pub fn to_policy(self) -> (VersionPolicy, BinMode) {
        match self {
            RecordExistsAction::Update => (VersionPolicy::None, BinMode::Merge),
            RecordExistsAction::UpdateOnly => (VersionPolicy::MustExist, BinMode::Merge),
            RecordExistsAction::Replace => (VersionPolicy::None, BinMode::Replace),
            RecordExistsAction::ReplaceOnly => (VersionPolicy::MustExist, BinMode::Replace),
            RecordExistsAction::CreateOnly => (VersionPolicy::MustNotExist, BinMode::Replace),
        }
    }
}

/// Storage-level policy handed to a client with every write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePolicy {
    /// Existence/generation precondition
    pub version: VersionPolicy,
    /// Bin combination mode
    pub bin_mode: BinMode,
    /// Time-to-live of the written record
    pub expiration: Expiration,
}

impl WritePolicy {
    /// Unconditional replace with the server default expiration
    pub fn new() -> Self {
        WritePolicy {
            version: VersionPolicy::None,
            bin_mode: BinMode::Replace,
            expiration: Expiration::ServerDefault,
        }
    }

    /// Set the version precondition
    pub fn with_version(mut self, version: VersionPolicy) -> Self {
        self.version = version;
        self
    }

    /// Set the bin mode
    pub fn with_bin_mode(mut self, bin_mode: BinMode) -> Self {
        self.bin_mode = bin_mode;
        self
    }

    /// Set the expiration
    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = expiration;
        self
    }
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Data produced by the converter for a single write
///
/// Owned exclusively by the write call that produced it; never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    /// Target key
    pub key: Key,
    /// Bins to write
    pub bins: Bins,
    /// Requested time-to-live
    pub expiration: Expiration,
    /// Precondition, attached by the policy resolver
    pub version_policy: VersionPolicy,
}

impl WriteRecord {
    /// Create a write record with no precondition
    pub fn new(key: Key) -> Self {
        WriteRecord {
            key,
            bins: Bins::new(),
            expiration: Expiration::ServerDefault,
            version_policy: VersionPolicy::None,
        }
    }

    /// Add a bin
    pub fn put_bin(&mut self, name: impl Into<String>, value: Value) {
        self.bins.insert(name.into(), value);
    }

    /// The policy a client should apply for this record
    pub fn write_policy(&self, bin_mode: BinMode) -> WritePolicy {
        WritePolicy {
            version: self.version_policy,
            bin_mode,
            expiration: self.expiration,
        }
    }
}

/// A record as returned by a storage client
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRecord {
    /// Key the record was read from
    pub key: Key,
    /// Raw bins
    pub bins: Bins,
    /// Current generation
    pub generation: Generation,
    /// Seconds until expiry, `None` if the record never expires
    pub expiration: Option<u32>,
}

impl ReadRecord {
    /// Create a read record
    pub fn new(key: Key, bins: Bins, generation: Generation, expiration: Option<u32>) -> Self {
        ReadRecord {
            key,
            bins,
            generation,
            expiration,
        }
    }

    /// Get a bin value
    pub fn bin(&self, name: &str) -> Option<&Value> {
        self.bins.get(name)
    }
}
