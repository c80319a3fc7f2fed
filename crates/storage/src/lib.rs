//! Storage backends for recmap
//!
//! This crate provides an in-process implementation of the storage
//! client traits:
//! - InMemoryStore: DashMap-backed wide-column store with generations,
//!   write preconditions and time-to-live
//!
//! Both the blocking `StorageClient` and the `AsyncStorageClient` traits
//! are implemented by the same store, so a blocking and an async
//! template can share one instance.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod stored;

pub use memory::InMemoryStore;
pub use stored::StoredRecord;
