//! Batch duplicate detection
//!
//! `insert_all` writes each element independently. Elements that share a
//! key with an earlier element are rejected locally, before any storage
//! call, without affecting their siblings.

use std::collections::hash_map::Entry;

use recmap_core::{Key, OperationKind, RejectReason};
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::protocol::WriteOutcome;

/// For each position, the index of the first element with the same key
///
/// `None` for first occurrences and for elements whose key could not be
/// computed.
pub fn find_duplicates<'k, I>(keys: I) -> Vec<Option<usize>>
where
    I: IntoIterator<Item = Option<&'k Key>>,
{
    let mut first_seen: FxHashMap<&Key, usize> = FxHashMap::default();
    keys.into_iter()
        .enumerate()
        .map(|(index, key)| {
            let key = key?;
            match first_seen.entry(key) {
                Entry::Occupied(first) => Some(*first.get()),
                Entry::Vacant(slot) => {
                    slot.insert(index);
                    None
                }
            }
        })
        .collect()
}

/// Outcome for an element rejected as a duplicate within its batch
pub fn duplicate_outcome<E>(operation: OperationKind, key: Key, index: usize, first: usize) -> WriteOutcome<E> {
    warn!(%operation, %key, index, first, "duplicate key in batch");
    WriteOutcome::Rejected {
        operation,
        key,
        reason: RejectReason::KeyExists,
        observed_generation: None,
    }
}
