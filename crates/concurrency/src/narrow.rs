//! Narrow operations on named bins
//!
//! `add`, `append` and `prepend` skip the version precondition. They send
//! the modifying operations plus one `Get` per touched bin in a single
//! `operate` call, then decode only the touched fields into a copy of the
//! entity. The copy's version is reconciled from the returned generation.

use std::sync::Arc;

use recmap_core::{
    AsyncStorageClient, BinMode, ClientError, Error, Key, Operation, OperationKind,
    PreconditionError, ReadRecord, StorageClient, WritePolicy,
};
use recmap_mapping::{describe, Converter, Entity, EntityDescriptor};

use crate::protocol::{transition, WriteOutcome, WriteState};

/// Modifying operations for integer adds, keyed by bin name
pub fn add_ops<'v>(values: impl IntoIterator<Item = (&'v str, i64)>) -> Vec<Operation> {
    values
        .into_iter()
        .map(|(bin, delta)| Operation::add(bin, delta))
        .collect()
}

/// Modifying operations for string appends, keyed by bin name
pub fn append_ops<'v>(values: impl IntoIterator<Item = (&'v str, &'v str)>) -> Vec<Operation> {
    values
        .into_iter()
        .map(|(bin, suffix)| Operation::append(bin, suffix))
        .collect()
}

/// Modifying operations for string prepends, keyed by bin name
pub fn prepend_ops<'v>(values: impl IntoIterator<Item = (&'v str, &'v str)>) -> Vec<Operation> {
    values
        .into_iter()
        .map(|(bin, prefix)| Operation::prepend(bin, prefix))
        .collect()
}

/// A narrow operation that has been validated and planned
pub struct NarrowWrite<'a, E> {
    cx: &'a Converter,
    descriptor: Arc<EntityDescriptor<E>>,
    entity: E,
    operation: OperationKind,
    key: Key,
    ops: Vec<Operation>,
    bins: Vec<String>,
    policy: WritePolicy,
    state: WriteState,
}

impl<'a, E: Entity + Clone> NarrowWrite<'a, E> {
    /// Validate `changes` against the entity's mapped bins and plan the call
    ///
    /// Every change must target a bin mapped to an ordinary property that
    /// can be assigned after construction.
    pub fn prepare(
        cx: &'a Converter,
        entity: E,
        operation: OperationKind,
        changes: Vec<Operation>,
    ) -> Result<Self, Error> {
        let mut state = WriteState::Pending;
        transition(&mut state, WriteState::Encoding, operation, None);
        let planned = Self::plan(cx, &entity, changes);
        let (descriptor, key, ops, bins, policy) = match planned {
            Ok(planned) => planned,
            Err(err) => {
                transition(&mut state, WriteState::Failed, operation, None);
                return Err(err);
            }
        };
        transition(&mut state, WriteState::Resolving, operation, Some(&key));
        transition(&mut state, WriteState::Sending, operation, Some(&key));
        Ok(NarrowWrite {
            cx,
            descriptor,
            entity,
            operation,
            key,
            ops,
            bins,
            policy,
            state,
        })
    }

    #[allow(clippy::type_complexity)]
    fn plan(
        cx: &Converter,
        entity: &E,
        changes: Vec<Operation>,
    ) -> Result<(Arc<EntityDescriptor<E>>, Key, Vec<Operation>, Vec<String>, WritePolicy), Error> {
        let descriptor = describe::<E>()?;
        if changes.is_empty() {
            return Err(PreconditionError::InvalidArgument(format!(
                "no bins given for '{}'",
                descriptor.type_tag()
            ))
            .into());
        }

        let mut bins: Vec<String> = Vec::with_capacity(changes.len());
        for change in &changes {
            let bin = change.bin().unwrap_or_default();
            // constructor parameters cannot be refreshed on the returned copy
            let settable = descriptor
                .property_by_bin(bin)
                .is_some_and(|field| field.is_settable());
            if bin.is_empty() || !settable {
                return Err(PreconditionError::InvalidBin {
                    type_tag: descriptor.type_tag().to_string(),
                    bin: bin.to_string(),
                }
                .into());
            }
            if !bins.iter().any(|b| b == bin) {
                bins.push(bin.to_string());
            }
        }

        let key = cx.key_of(&descriptor, entity)?;
        let expiration = descriptor.expiration_of(entity, cx)?;
        let mut ops = changes;
        ops.extend(bins.iter().map(Operation::get));
        let policy = WritePolicy::new()
            .with_bin_mode(BinMode::Merge)
            .with_expiration(expiration);
        Ok((descriptor, key, ops, bins, policy))
    }

    /// Target key
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Operations that will be sent, reads included
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Bins whose fields will be refreshed
    pub fn bins(&self) -> &[String] {
        &self.bins
    }

    /// Run the call on a blocking client
    pub fn execute<C: StorageClient + ?Sized>(self, client: &C) -> WriteOutcome<E> {
        let result = client.operate(&self.policy, &self.key, &self.ops);
        self.complete(result)
    }

    /// Run the call on an async client
    pub async fn execute_async<C: AsyncStorageClient + ?Sized>(self, client: &C) -> WriteOutcome<E> {
        let result = client.operate(&self.policy, &self.key, &self.ops).await;
        self.complete(result)
    }

    fn complete(mut self, result: Result<ReadRecord, ClientError>) -> WriteOutcome<E> {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                transition(&mut self.state, WriteState::Failed, self.operation, Some(&self.key));
                return WriteOutcome::Failed(Error::from_client(self.operation, self.key, err));
            }
        };
        transition(&mut self.state, WriteState::Reconciling, self.operation, Some(&self.key));
        match self
            .cx
            .apply_bins(&self.descriptor, &self.entity, &record, &self.bins)
        {
            Ok(entity) => {
                transition(&mut self.state, WriteState::Committed, self.operation, Some(&self.key));
                WriteOutcome::Committed {
                    entity,
                    generation: record.generation,
                }
            }
            Err(err) => {
                transition(&mut self.state, WriteState::Failed, self.operation, Some(&self.key));
                WriteOutcome::Failed(err.into())
            }
        }
    }
}
