//! Optimistic write protocol
//!
//! One entity write walks a fixed state machine:
//!
//! ```text
//! Pending -> Encoding -> Resolving -> Sending -> Reconciling -> Committed
//!                                       |
//!                                       +-> Rejected
//! (any non-terminal state) -> Failed
//! ```
//!
//! | State | Work |
//! |-------|------|
//! | Encoding | entity -> write record via the converter |
//! | Resolving | version state + write mode -> storage precondition |
//! | Sending | one storage call, no internal retries |
//! | Reconciling | store generation -> version field |
//!
//! Encoding and resolving happen eagerly in [`PreparedWrite::prepare`].
//! Only the storage call differs between [`PreparedWrite::execute`] and
//! [`PreparedWrite::execute_async`]; both finish through the same
//! reconciliation step, so blocking and async callers see identical
//! outcomes.
//!
//! The protocol owns the entity it writes and hands back the updated copy.
//! Callers apply it to their own handle only on `Committed`, which keeps a
//! cancelled async write from touching the caller's entity.

use std::sync::Arc;

use recmap_core::{
    AsyncStorageClient, Bins, ClientError, Error, Generation, Key, OperationKind, RejectReason,
    ResultCode, StorageClient, VersionPolicy, WritePolicy,
};
use recmap_mapping::{describe, Converter, Entity, EntityDescriptor};
use tracing::{debug, warn};

use crate::policy::{resolve, WriteMode};

// ============================================================================
// States and outcomes
// ============================================================================

/// Protocol state of one write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Not started
    Pending,
    /// Converting the entity into a write record
    Encoding,
    /// Computing the storage precondition
    Resolving,
    /// Waiting on the storage call
    Sending,
    /// Applying the new generation to the entity
    Reconciling,
    /// Written, entity reconciled
    Committed,
    /// Precondition violated by the store
    Rejected,
    /// Any other failure
    Failed,
}

impl WriteState {
    /// Whether the write has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, WriteState::Committed | WriteState::Rejected | WriteState::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(self, next: WriteState) -> bool {
        use WriteState::*;
        match (self, next) {
            (Pending, Encoding)
            | (Encoding, Resolving)
            | (Resolving, Sending)
            | (Sending, Reconciling)
            | (Sending, Rejected)
            | (Reconciling, Committed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Final result of one write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<E> {
    /// Written; `entity` carries the reconciled version
    Committed {
        /// Updated entity
        entity: E,
        /// Generation assigned by the store
        generation: Generation,
    },
    /// Optimistic-lock conflict
    Rejected {
        /// Operation
        operation: OperationKind,
        /// Target key
        key: Key,
        /// Which precondition failed
        reason: RejectReason,
        /// Generation the store reported, if any
        observed_generation: Option<Generation>,
    },
    /// Anything else
    Failed(Error),
}

impl<E> WriteOutcome<E> {
    /// Terminal state this outcome corresponds to
    pub fn state(&self) -> WriteState {
        match self {
            WriteOutcome::Committed { .. } => WriteState::Committed,
            WriteOutcome::Rejected { .. } => WriteState::Rejected,
            WriteOutcome::Failed(_) => WriteState::Failed,
        }
    }

    /// Whether the write went through
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed { .. })
    }

    /// Convert into the public error taxonomy
    pub fn into_result(self) -> Result<(E, Generation), Error> {
        match self {
            WriteOutcome::Committed { entity, generation } => Ok((entity, generation)),
            WriteOutcome::Rejected {
                operation,
                key,
                reason,
                observed_generation,
            } => Err(Error::OptimisticLock {
                operation,
                key,
                reason,
                observed_generation,
            }),
            WriteOutcome::Failed(err) => Err(err),
        }
    }
}

/// Map a client error onto an outcome
///
/// Only key-exists under `MustNotExist` and generation mismatch under
/// `ExpectGeneration` are rejections. Everything else fails.
pub fn classify<E>(
    operation: OperationKind,
    key: Key,
    precondition: VersionPolicy,
    err: ClientError,
) -> WriteOutcome<E> {
    let reason = match (precondition, err.code) {
        (VersionPolicy::MustNotExist, ResultCode::KeyExists) => Some(RejectReason::KeyExists),
        (VersionPolicy::ExpectGeneration(_), ResultCode::GenerationMismatch) => {
            Some(RejectReason::GenerationMismatch)
        }
        _ => None,
    };
    match reason {
        Some(reason) => {
            warn!(
                %operation,
                %key,
                %reason,
                observed_generation = ?err.observed_generation,
                "write rejected"
            );
            WriteOutcome::Rejected {
                operation,
                key,
                reason,
                observed_generation: err.observed_generation,
            }
        }
        None => WriteOutcome::Failed(Error::from_client(operation, key, err)),
    }
}

pub(crate) fn transition(
    state: &mut WriteState,
    next: WriteState,
    operation: OperationKind,
    key: Option<&Key>,
) {
    debug_assert!(state.can_advance_to(next), "illegal transition {:?} -> {:?}", state, next);
    match key {
        Some(key) => debug!(%operation, %key, from = ?*state, to = ?next, "write state"),
        None => debug!(%operation, from = ?*state, to = ?next, "write state"),
    }
    *state = next;
}

// ============================================================================
// Prepared write
// ============================================================================

/// A full-record write that has been encoded and resolved
///
/// Holds everything the storage call needs; nothing has been sent yet.
pub struct PreparedWrite<'a, E> {
    cx: &'a Converter,
    descriptor: Arc<EntityDescriptor<E>>,
    entity: E,
    operation: OperationKind,
    key: Key,
    bins: Bins,
    policy: WritePolicy,
    state: WriteState,
}

impl<'a, E: Entity> PreparedWrite<'a, E> {
    /// Encode `entity` and resolve its write policy
    ///
    /// Mapping failures and local precondition failures (such as updating
    /// a versioned entity that was never saved) surface here, before any
    /// storage call.
    pub fn prepare(cx: &'a Converter, entity: E, mode: WriteMode) -> Result<Self, Error> {
        let operation = mode.operation();
        let mut state = WriteState::Pending;

        transition(&mut state, WriteState::Encoding, operation, None);
        let encoded = describe::<E>().and_then(|descriptor| {
            let record = cx.to_record_with(&descriptor, &entity)?;
            Ok((descriptor, record))
        });
        let (descriptor, record) = match encoded {
            Ok(encoded) => encoded,
            Err(err) => {
                transition(&mut state, WriteState::Failed, operation, None);
                return Err(err.into());
            }
        };

        transition(&mut state, WriteState::Resolving, operation, Some(&record.key));
        let resolved = descriptor
            .version_of(&entity, cx)
            .map_err(Error::from)
            .and_then(|version| resolve(mode, version, &record.key).map_err(Error::from));
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                transition(&mut state, WriteState::Failed, operation, Some(&record.key));
                return Err(err);
            }
        };

        let policy = WritePolicy {
            version: resolved.version,
            bin_mode: resolved.bin_mode,
            expiration: record.expiration,
        };
        Ok(PreparedWrite {
            cx,
            descriptor,
            entity,
            operation,
            key: record.key,
            bins: record.bins,
            policy,
            state,
        })
    }

    /// Target key
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Bins that will be written
    pub fn bins(&self) -> &Bins {
        &self.bins
    }

    /// Storage policy that will be sent
    pub fn policy(&self) -> &WritePolicy {
        &self.policy
    }

    /// Current protocol state
    pub fn state(&self) -> WriteState {
        self.state
    }

    /// Run the storage call on a blocking client
    pub fn execute<C: StorageClient + ?Sized>(mut self, client: &C) -> WriteOutcome<E> {
        transition(&mut self.state, WriteState::Sending, self.operation, Some(&self.key));
        let result = client.put(&self.policy, &self.key, &self.bins);
        self.complete(result)
    }

    /// Run the storage call on an async client
    ///
    /// Dropping the returned future before it completes discards the
    /// write's local state; nothing is reconciled.
    pub async fn execute_async<C: AsyncStorageClient + ?Sized>(mut self, client: &C) -> WriteOutcome<E> {
        transition(&mut self.state, WriteState::Sending, self.operation, Some(&self.key));
        let result = client.put(&self.policy, &self.key, &self.bins).await;
        self.complete(result)
    }

    fn complete(mut self, result: Result<Generation, ClientError>) -> WriteOutcome<E> {
        let generation = match result {
            Ok(generation) => generation,
            Err(err) => {
                let outcome = classify(self.operation, self.key.clone(), self.policy.version, err);
                transition(&mut self.state, outcome.state(), self.operation, Some(&self.key));
                return outcome;
            }
        };

        transition(&mut self.state, WriteState::Reconciling, self.operation, Some(&self.key));
        let mut entity = self.entity;
        if let Err(err) = self.descriptor.set_version(&mut entity, generation, self.cx) {
            transition(&mut self.state, WriteState::Failed, self.operation, Some(&self.key));
            return WriteOutcome::Failed(err.into());
        }
        transition(&mut self.state, WriteState::Committed, self.operation, Some(&self.key));
        WriteOutcome::Committed { entity, generation }
    }
}
