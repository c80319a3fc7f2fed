//! Error types for recmap
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Taxonomy
//!
//! | Error | Raised by | Retryable |
//! |-------|-----------|-----------|
//! | `MappingError` | descriptor build, write conversion | no |
//! | `DecodeError` | record-to-entity conversion | no |
//! | `Error::OptimisticLock` | rejected write precondition | yes, after re-read |
//! | `PreconditionError` | argument checks before any network call | no |
//! | `Error::NotFound` / `Error::Transport` / `Error::SetTransport` | storage client | no |

use crate::key::Key;
use crate::record::Generation;
use std::fmt;
use thiserror::Error;

/// Result type alias for recmap operations
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Mapping errors
// ============================================================================

/// A type's mapping metadata is malformed
///
/// Raised the first time a malformed type is used. Never retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// More than one identifier field
    #[error("type '{type_tag}' declares more than one identifier field ('{first}' and '{second}')")]
    DuplicateIdentifier {
        /// Type alias
        type_tag: String,
        /// First identifier field
        first: String,
        /// Second identifier field
        second: String,
    },

    /// No identifier field
    #[error("type '{type_tag}' declares no identifier field")]
    MissingIdentifier {
        /// Type alias
        type_tag: String,
    },

    /// More than one version field
    #[error("type '{type_tag}' declares more than one version field ('{first}' and '{second}')")]
    DuplicateVersion {
        /// Type alias
        type_tag: String,
        /// First version field
        first: String,
        /// Second version field
        second: String,
    },

    /// Version field is not an integer
    #[error("version field '{field}' of type '{type_tag}' has unsupported shape {shape}")]
    UnsupportedVersionShape {
        /// Type alias
        type_tag: String,
        /// Field name
        field: String,
        /// Declared shape
        shape: String,
    },

    /// More than one expiration field
    #[error("type '{type_tag}' declares more than one expiration field")]
    DuplicateExpiration {
        /// Type alias
        type_tag: String,
    },

    /// Two fields map to the same name or bin
    #[error("type '{type_tag}' maps '{field}' more than once")]
    DuplicateField {
        /// Type alias
        type_tag: String,
        /// Field or bin name
        field: String,
    },

    /// No way to construct instances
    #[error("type '{type_tag}' has no constructor")]
    MissingConstructor {
        /// Type alias
        type_tag: String,
    },

    /// A field populated after construction has no setter
    #[error("field '{field}' of type '{type_tag}' is neither a constructor parameter nor settable")]
    MissingSetter {
        /// Type alias
        type_tag: String,
        /// Field name
        field: String,
    },

    /// Two Rust types declare the same type alias
    #[error("type alias '{type_tag}' is already registered for {registered}, cannot register {conflicting}")]
    DuplicateTypeAlias {
        /// Type alias
        type_tag: String,
        /// Rust type holding the alias
        registered: String,
        /// Rust type that was refused
        conflicting: String,
    },

    /// Identifier value cannot address a record
    #[error("identifier of type '{type_tag}' must be an integer, string or bytes, got {actual}")]
    InvalidIdentifier {
        /// Type alias
        type_tag: String,
        /// Value type found
        actual: &'static str,
    },

    /// A value has no representation in the generic value model
    #[error("cannot convert {what}: {reason}")]
    Unsupported {
        /// What was being converted
        what: String,
        /// Why it failed
        reason: String,
    },
}

impl MappingError {
    /// Create an `Unsupported` error
    pub fn unsupported(what: impl Into<String>, reason: impl Into<String>) -> Self {
        MappingError::Unsupported {
            what: what.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Decode errors
// ============================================================================

/// A stored record cannot be turned back into an entity
///
/// `field` holds the dotted path of the field being decoded
/// (e.g. `address.street`), empty when the error concerns the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Required value is absent
    #[error("missing value for required field '{field}'")]
    MissingField {
        /// Field path
        field: String,
    },

    /// Stored value has the wrong variant
    #[error("field '{field}': expected {expected}, found {actual}")]
    TypeMismatch {
        /// Field path
        field: String,
        /// Expected variant
        expected: &'static str,
        /// Found variant
        actual: &'static str,
    },

    /// Stored enum name is not a known variant
    #[error("field '{field}': '{variant}' is not a variant of {enum_name}")]
    UnknownEnumVariant {
        /// Field path
        field: String,
        /// Enum type name
        enum_name: &'static str,
        /// Stored name
        variant: String,
    },

    /// Stored discriminator resolves to no registered type
    #[error("field '{field}': unknown type alias '{alias}'")]
    UnknownTypeAlias {
        /// Field path
        field: String,
        /// Stored alias
        alias: String,
    },

    /// Stored discriminator resolves to a type other than the target
    #[error("field '{field}': expected type '{expected}', record holds '{actual}'")]
    UnexpectedType {
        /// Field path
        field: String,
        /// Target type alias
        expected: String,
        /// Stored type alias
        actual: String,
    },

    /// Neither the key nor the stored bins carry an identifier
    #[error("record of type '{type_tag}' carries no identifier")]
    MissingIdentifier {
        /// Type alias
        type_tag: String,
    },

    /// Value is of the right variant but out of range or malformed
    #[error("field '{field}': {reason}")]
    InvalidValue {
        /// Field path
        field: String,
        /// Why it is invalid
        reason: String,
    },
}

impl DecodeError {
    /// Create a type mismatch for the current field
    pub fn type_mismatch(expected: &'static str, actual: &'static str) -> Self {
        DecodeError::TypeMismatch {
            field: String::new(),
            expected,
            actual,
        }
    }

    /// Create an invalid-value error for the current field
    pub fn invalid(reason: impl Into<String>) -> Self {
        DecodeError::InvalidValue {
            field: String::new(),
            reason: reason.into(),
        }
    }

    /// Create a missing-field error for the current field
    pub fn missing() -> Self {
        DecodeError::MissingField {
            field: String::new(),
        }
    }

    /// Prefix the field path with an enclosing field or index
    pub fn at(mut self, segment: &str) -> Self {
        if let Some(field) = self.field_mut() {
            *field = if field.is_empty() {
                segment.to_string()
            } else if field.starts_with('[') {
                format!("{}{}", segment, field)
            } else {
                format!("{}.{}", segment, field)
            };
        }
        self
    }

    /// Field path this error refers to
    pub fn field(&self) -> Option<&str> {
        match self {
            DecodeError::MissingField { field }
            | DecodeError::TypeMismatch { field, .. }
            | DecodeError::UnknownEnumVariant { field, .. }
            | DecodeError::UnknownTypeAlias { field, .. }
            | DecodeError::UnexpectedType { field, .. }
            | DecodeError::InvalidValue { field, .. } => Some(field),
            DecodeError::MissingIdentifier { .. } => None,
        }
    }

    fn field_mut(&mut self) -> Option<&mut String> {
        match self {
            DecodeError::MissingField { field }
            | DecodeError::TypeMismatch { field, .. }
            | DecodeError::UnknownEnumVariant { field, .. }
            | DecodeError::UnknownTypeAlias { field, .. }
            | DecodeError::UnexpectedType { field, .. }
            | DecodeError::InvalidValue { field, .. } => Some(field),
            DecodeError::MissingIdentifier { .. } => None,
        }
    }
}

// ============================================================================
// Precondition errors
// ============================================================================

/// Invalid argument caught before any network call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    /// Update of a versioned entity that was never persisted
    #[error("cannot update {key}: version is unset, the entity was never persisted")]
    VersionNotSet {
        /// Target key
        key: String,
    },

    /// Touch-on-read type also maps its expiration as a field
    #[error("type '{type_tag}' combines touch-on-read with an expiration field")]
    TouchOnReadWithExpirationField {
        /// Type alias
        type_tag: String,
    },

    /// Narrow operation without bins, or with an unmapped bin
    #[error("invalid bin '{bin}' for type '{type_tag}'")]
    InvalidBin {
        /// Type alias
        type_tag: String,
        /// Bin name
        bin: String,
    },

    /// Any other invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

// ============================================================================
// Storage client errors
// ============================================================================

/// Result code reported by a storage client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Record does not exist
    KeyNotFound,
    /// Record already exists
    KeyExists,
    /// Record generation differs from the expected one
    GenerationMismatch,
    /// Operation is incompatible with a stored bin's type
    BinTypeMismatch,
    /// Client or server timeout
    Timeout,
    /// Anything else, with the raw code
    Other(i32),
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::KeyNotFound => write!(f, "key not found"),
            ResultCode::KeyExists => write!(f, "key exists"),
            ResultCode::GenerationMismatch => write!(f, "generation mismatch"),
            ResultCode::BinTypeMismatch => write!(f, "bin type mismatch"),
            ResultCode::Timeout => write!(f, "timeout"),
            ResultCode::Other(code) => write!(f, "result code {}", code),
        }
    }
}

/// Error returned by a storage client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ClientError {
    /// Result code
    pub code: ResultCode,
    /// Human readable detail
    pub message: String,
    /// Generation the server observed, when it reports one
    pub observed_generation: Option<Generation>,
}

impl ClientError {
    /// Create a client error
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        ClientError {
            code,
            message: message.into(),
            observed_generation: None,
        }
    }

    /// Attach the generation observed by the server
    pub fn with_observed_generation(mut self, generation: Generation) -> Self {
        self.observed_generation = Some(generation);
        self
    }
}

// ============================================================================
// Top-level error
// ============================================================================

/// Why a write precondition was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Record exists but the write required it not to
    KeyExists,
    /// Record is at a different generation than expected
    GenerationMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::KeyExists => write!(f, "key exists"),
            RejectReason::GenerationMismatch => write!(f, "generation mismatch"),
        }
    }
}

/// Kind of operation an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Save (versioned or full overwrite)
    Save,
    /// Insert (create only)
    Insert,
    /// Update (must exist)
    Update,
    /// Persist with an explicit record-exists action
    Persist,
    /// Integer add
    Add,
    /// String append
    Append,
    /// String prepend
    Prepend,
    /// Delete
    Delete,
    /// Existence check
    Exists,
    /// Point read
    FindById,
    /// Removal of every record of a type
    DeleteAll,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Save => "save",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Persist => "persist",
            OperationKind::Add => "add",
            OperationKind::Append => "append",
            OperationKind::Prepend => "prepend",
            OperationKind::Delete => "delete",
            OperationKind::Exists => "exists",
            OperationKind::FindById => "find_by_id",
            OperationKind::DeleteAll => "delete_all",
        };
        f.write_str(name)
    }
}

/// Error type for recmap operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Malformed mapping metadata
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Record cannot be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Write precondition rejected by the store
    #[error("optimistic lock failure during {operation} on {key}: {reason}")]
    OptimisticLock {
        /// Operation
        operation: OperationKind,
        /// Target key
        key: Key,
        /// Rejection reason
        reason: RejectReason,
        /// Generation the store observed, when reported
        observed_generation: Option<Generation>,
    },

    /// Invalid argument caught before any network call
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// Store reported the record absent where it had to exist
    #[error("record not found during {operation} on {key}")]
    NotFound {
        /// Operation
        operation: OperationKind,
        /// Target key
        key: Key,
    },

    /// Any other storage client failure
    #[error("{operation} on {key} failed: {source}")]
    Transport {
        /// Operation
        operation: OperationKind,
        /// Target key
        key: Key,
        /// Client error
        #[source]
        source: ClientError,
    },

    /// A storage client failure on a whole set rather than one record
    #[error("{operation} on set {namespace}:{set_name} failed: {source}")]
    SetTransport {
        /// Operation
        operation: OperationKind,
        /// Namespace
        namespace: String,
        /// Set name
        set_name: String,
        /// Client error
        #[source]
        source: ClientError,
    },
}

impl Error {
    /// Generic translation of a client error outside the OCC write path
    ///
    /// Not-found becomes `NotFound`; everything else is wrapped as-is.
    pub fn from_client(operation: OperationKind, key: Key, source: ClientError) -> Self {
        match source.code {
            ResultCode::KeyNotFound => Error::NotFound { operation, key },
            _ => Error::Transport {
                operation,
                key,
                source,
            },
        }
    }

    /// Whether this is an optimistic-lock rejection
    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, Error::OptimisticLock { .. })
    }

    /// Rejection reason, for optimistic-lock errors
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Error::OptimisticLock { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether a caller may re-read and retry
    ///
    /// Only optimistic-lock rejections qualify; the core never retries.
    pub fn is_retryable(&self) -> bool {
        self.is_optimistic_lock()
    }
}
