//! Storage client abstraction
//!
//! The mapping and write-protocol layers never talk to a concrete store.
//! They go through `StorageClient` (blocking) or `AsyncStorageClient`
//! (cooperatively suspending), which allows swapping the in-memory store
//! for a networked client without touching upper layers.
//!
//! Both traits share the same contract:
//!
//! - Writes honor every field of the supplied `WritePolicy`.
//! - A rejected precondition is reported as a `ClientError` with
//!   `ResultCode::KeyExists`, `ResultCode::GenerationMismatch` or
//!   `ResultCode::KeyNotFound`, never as a successful result.
//! - Every successful write increments the record generation by one.
//!
//! Thread safety: all methods must be safe to call concurrently
//! (requires Send + Sync).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::key::Key;
use crate::operation::Operation;
use crate::record::{Bins, Generation, ReadRecord, WritePolicy};

/// Blocking storage client
pub trait StorageClient: Send + Sync {
    /// Read a whole record
    ///
    /// Returns `None` if the record does not exist or has expired.
    fn get(&self, key: &Key) -> Result<Option<ReadRecord>, ClientError>;

    /// Write bins under the given policy
    ///
    /// Returns the generation of the record after the write.
    fn put(&self, policy: &WritePolicy, key: &Key, bins: &Bins) -> Result<Generation, ClientError>;

    /// Apply a list of operations atomically in one round trip
    ///
    /// The returned record carries the bins requested by read operations,
    /// the generation after all writes, and the remaining time-to-live.
    /// A missing record fails with `ResultCode::KeyNotFound` unless the
    /// list contains a write the policy allows to create it.
    fn operate(
        &self,
        policy: &WritePolicy,
        key: &Key,
        ops: &[Operation],
    ) -> Result<ReadRecord, ClientError>;

    /// Delete a record
    ///
    /// Returns whether a record was removed.
    fn delete(&self, key: &Key) -> Result<bool, ClientError>;

    /// Check whether a record exists
    fn exists(&self, key: &Key) -> Result<bool, ClientError>;

    /// Remove every record of one set in a namespace
    ///
    /// Records of other sets, and sets of the same name in other
    /// namespaces, are left alone. Truncating an empty set succeeds.
    fn truncate(&self, namespace: &str, set_name: &str) -> Result<(), ClientError>;
}

/// Asynchronous storage client
///
/// Same contract as [`StorageClient`]. Dropping a returned future before
/// it completes must not leave a partially applied write behind.
#[async_trait]
pub trait AsyncStorageClient: Send + Sync {
    /// Read a whole record
    async fn get(&self, key: &Key) -> Result<Option<ReadRecord>, ClientError>;

    /// Write bins under the given policy
    async fn put(
        &self,
        policy: &WritePolicy,
        key: &Key,
        bins: &Bins,
    ) -> Result<Generation, ClientError>;

    /// Apply a list of operations atomically in one round trip
    async fn operate(
        &self,
        policy: &WritePolicy,
        key: &Key,
        ops: &[Operation],
    ) -> Result<ReadRecord, ClientError>;

    /// Delete a record
    async fn delete(&self, key: &Key) -> Result<bool, ClientError>;

    /// Check whether a record exists
    async fn exists(&self, key: &Key) -> Result<bool, ClientError>;

    /// Remove every record of one set in a namespace
    async fn truncate(&self, namespace: &str, set_name: &str) -> Result<(), ClientError>;
}

// ============================================================================
// Shared clients
// ============================================================================

impl<T: StorageClient + ?Sized> StorageClient for Arc<T> {
    fn get(&self, key: &Key) -> Result<Option<ReadRecord>, ClientError> {
        (**self).get(key)
    }

    fn put(&self, policy: &WritePolicy, key: &Key, bins: &Bins) -> Result<Generation, ClientError> {
        (**self).put(policy, key, bins)
    }

    fn operate(
        &self,
        policy: &WritePolicy,
        key: &Key,
        ops: &[Operation],
    ) -> Result<ReadRecord, ClientError> {
        (**self).operate(policy, key, ops)
    }

    fn delete(&self, key: &Key) -> Result<bool, ClientError> {
        (**self).delete(key)
    }

    fn exists(&self, key: &Key) -> Result<bool, ClientError> {
        (**self).exists(key)
    }

    fn truncate(&self, namespace: &str, set_name: &str) -> Result<(), ClientError> {
        (**self).truncate(namespace, set_name)
    }
}

#[async_trait]
impl<T: AsyncStorageClient + ?Sized> AsyncStorageClient for Arc<T> {
    async fn get(&self, key: &Key) -> Result<Option<ReadRecord>, ClientError> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        policy: &WritePolicy,
        key: &Key,
        bins: &Bins,
    ) -> Result<Generation, ClientError> {
        (**self).put(policy, key, bins).await
    }

    async fn operate(
        &self,
        policy: &WritePolicy,
        key: &Key,
        ops: &[Operation],
    ) -> Result<ReadRecord, ClientError> {
        (**self).operate(policy, key, ops).await
    }

    async fn delete(&self, key: &Key) -> Result<bool, ClientError> {
        (**self).delete(key).await
    }

    async fn exists(&self, key: &Key) -> Result<bool, ClientError> {
        (**self).exists(key).await
    }

    async fn truncate(&self, namespace: &str, set_name: &str) -> Result<(), ClientError> {
        (**self).truncate(namespace, set_name).await
    }
}
