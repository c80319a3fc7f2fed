//! Core types and traits for recmap
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Generic value model stored in record bins
//! - Key / UserKey: Record addressing
//! - WriteRecord / ReadRecord: Data exchanged with a storage client
//! - WritePolicy / VersionPolicy: Write preconditions
//! - Operation: Narrow in-place record operations
//! - Error: Error type hierarchy
//! - Traits: Storage client abstractions (blocking and async)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod operation;
pub mod record;
pub mod time;
pub mod traits;
pub mod value;

pub use error::{
    ClientError, DecodeError, Error, MappingError, OperationKind, PreconditionError, RejectReason,
    Result, ResultCode,
};
pub use key::{Key, UserKey};
pub use operation::Operation;
pub use record::{
    BinMode, Bins, Expiration, Generation, ReadRecord, RecordExistsAction, VersionPolicy,
    WritePolicy, WriteRecord,
};
pub use traits::{AsyncStorageClient, StorageClient};
pub use value::{NestedRecord, Value};
