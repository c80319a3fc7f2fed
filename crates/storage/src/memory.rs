//! In-memory wide-column store
//!
//! `InMemoryStore` implements both storage client traits over a sharded
//! map. It reproduces the server behaviors the write protocol relies on:
//!
//! - Generation counters: 1 on creation, +1 on every successful write
//! - Write preconditions: must-exist, must-not-exist, expected generation
//! - Time-to-live with a store-wide default and lazy expiry on access
//! - Atomic multi-operation calls (`operate`) with in-call reads
//!
//! # Design
//!
//! - DashMap: sharded, reads never block other shards
//! - FxHasher: fast non-crypto hash for keys
//! - Every check-and-write runs under the target shard's entry lock, so
//!   two writers racing on the same key from the same generation cannot
//!   both succeed.
//!
//! `put` honors the policy's bin mode. `operate` always modifies the
//! stored record in place.

use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use recmap_core::time::now_unix_secs;
use recmap_core::{
    AsyncStorageClient, BinMode, Bins, ClientError, Generation, Key, Operation, ReadRecord,
    ResultCode, StorageClient, Value, VersionPolicy, WritePolicy,
};
use rustc_hash::FxHasher;
use tracing::debug;

use crate::stored::{expiry_for, StoredRecord};

type FxBuildHasher = BuildHasherDefault<FxHasher>;
type RecordEntry<'a> = Entry<'a, Key, StoredRecord, FxBuildHasher>;

/// In-memory implementation of the storage client traits
pub struct InMemoryStore {
    records: DashMap<Key, StoredRecord, FxBuildHasher>,
    /// Time-to-live applied for `Expiration::ServerDefault`
    default_ttl: Option<u32>,
    /// Seconds added to the wall clock, for simulating the passage of time
    clock_offset: AtomicI64,
    round_trips: AtomicU64,
}

impl InMemoryStore {
    /// Create a store whose records never expire by default
    pub fn new() -> Self {
        InMemoryStore {
            records: DashMap::with_hasher(FxBuildHasher::default()),
            default_ttl: None,
            clock_offset: AtomicI64::new(0),
            round_trips: AtomicU64::new(0),
        }
    }

    /// Create a store with a default time-to-live in seconds
    pub fn with_default_ttl(default_ttl: u32) -> Self {
        InMemoryStore {
            default_ttl: Some(default_ttl),
            ..Self::new()
        }
    }

    /// Current store time in unix seconds
    pub fn now(&self) -> i64 {
        now_unix_secs() + self.clock_offset.load(Ordering::Relaxed)
    }

    /// Move the store clock forward
    pub fn advance_clock(&self, seconds: i64) {
        self.clock_offset.fetch_add(seconds, Ordering::Relaxed);
    }

    /// Number of client calls served so far
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Number of stored records, including expired ones not yet read
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Current generation of a live record
    pub fn generation_of(&self, key: &Key) -> Option<Generation> {
        let now = self.now();
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.generation)
    }

    fn remove_set(&self, namespace: &str, set_name: &str) -> usize {
        let before = self.records.len();
        self.records
            .retain(|key, _| key.namespace != namespace || key.set_name != set_name);
        let removed = before.saturating_sub(self.records.len());
        debug!(namespace, set_name, removed, "set truncated");
        removed
    }

    fn count_round_trip(&self) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
    }

    fn read(&self, key: &Key) -> Option<ReadRecord> {
        let now = self.now();
        let expired = match self.records.get(key) {
            Some(record) if !record.is_expired(now) => {
                return Some(record.to_read_record(key, record.bins.clone(), now));
            }
            Some(_) => true,
            None => false,
        };
        if expired && self.records.remove_if(key, |_, r| r.is_expired(now)).is_some() {
            debug!(key = %key, "expired record removed on read");
        }
        None
    }

    fn write_bins(&self, policy: &WritePolicy, key: &Key, bins: &Bins) -> Result<Generation, ClientError> {
        let now = self.now();
        let entry = self.records.entry(key.clone());
        let current = live(&entry, now);
        check_policy(policy.version, current)?;

        let mut stored = match (current, policy.bin_mode) {
            (Some(record), BinMode::Merge) => record.bins.clone(),
            _ => Bins::new(),
        };
        for (name, value) in bins {
            put_bin(&mut stored, name, value);
        }
        let record = StoredRecord {
            bins: stored,
            generation: next_generation(current),
            expires_at: expiry_for(policy.expiration, self.default_ttl, now),
        };
        let generation = record.generation;
        commit(entry, record);
        Ok(generation)
    }

    fn apply(&self, policy: &WritePolicy, key: &Key, ops: &[Operation]) -> Result<ReadRecord, ClientError> {
        let now = self.now();
        let entry = self.records.entry(key.clone());
        let current = live(&entry, now);
        check_policy(policy.version, current)?;

        let writes = ops.iter().any(Operation::is_write);
        let touches = ops.iter().any(|op| matches!(op, Operation::Touch));
        if current.is_none() && (!writes || touches) {
            return Err(ClientError::new(ResultCode::KeyNotFound, format!("{} does not exist", key)));
        }

        let mut bins = current.map(|record| record.bins.clone()).unwrap_or_default();
        let mut reads = Bins::new();
        for op in ops {
            match op {
                Operation::Put { bin, value } => put_bin(&mut bins, bin, value),
                Operation::Add { bin, delta } => {
                    let sum = match bins.get(bin) {
                        None => *delta,
                        Some(Value::Int(i)) => i.checked_add(*delta).ok_or_else(|| {
                            ClientError::new(ResultCode::Other(26), format!("add overflows bin '{}'", bin))
                        })?,
                        Some(other) => return Err(bin_type_mismatch(bin, "Int", other)),
                    };
                    bins.insert(bin.clone(), Value::Int(sum));
                }
                Operation::Append { bin, suffix } => {
                    let joined = match bins.get(bin) {
                        None => suffix.clone(),
                        Some(Value::String(s)) => format!("{}{}", s, suffix),
                        Some(other) => return Err(bin_type_mismatch(bin, "String", other)),
                    };
                    bins.insert(bin.clone(), Value::String(joined));
                }
                Operation::Prepend { bin, prefix } => {
                    let joined = match bins.get(bin) {
                        None => prefix.clone(),
                        Some(Value::String(s)) => format!("{}{}", prefix, s),
                        Some(other) => return Err(bin_type_mismatch(bin, "String", other)),
                    };
                    bins.insert(bin.clone(), Value::String(joined));
                }
                Operation::Touch | Operation::GetHeader => {}
                Operation::Get { bin } => {
                    if let Some(value) = bins.get(bin) {
                        reads.insert(bin.clone(), value.clone());
                    }
                }
                Operation::GetAll => reads.extend(bins.iter().map(|(k, v)| (k.clone(), v.clone()))),
            }
        }

        if !writes {
            // read-only: nothing to commit
            return Ok(match current {
                Some(record) => record.to_read_record(key, reads, now),
                None => ReadRecord::new(key.clone(), reads, 0, None),
            });
        }
        let record = StoredRecord {
            bins,
            generation: next_generation(current),
            expires_at: expiry_for(policy.expiration, self.default_ttl, now),
        };
        let result = record.to_read_record(key, reads, now);
        commit(entry, record);
        Ok(result)
    }

    fn remove(&self, key: &Key) -> bool {
        let now = self.now();
        match self.records.remove(key) {
            Some((_, record)) => !record.is_expired(now),
            None => false,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn live<'a>(entry: &'a RecordEntry<'_>, now: i64) -> Option<&'a StoredRecord> {
    match entry {
        Entry::Occupied(occupied) if !occupied.get().is_expired(now) => Some(occupied.get()),
        _ => None,
    }
}

fn commit(entry: RecordEntry<'_>, record: StoredRecord) {
    match entry {
        Entry::Occupied(mut occupied) => {
            occupied.insert(record);
        }
        Entry::Vacant(vacant) => {
            vacant.insert(record);
        }
    }
}

fn check_policy(policy: VersionPolicy, current: Option<&StoredRecord>) -> Result<(), ClientError> {
    match (policy, current) {
        (VersionPolicy::MustNotExist, Some(record)) => Err(ClientError::new(
            ResultCode::KeyExists,
            "record already exists",
        )
        .with_observed_generation(record.generation)),
        (VersionPolicy::MustExist, None) | (VersionPolicy::ExpectGeneration(_), None) => {
            Err(ClientError::new(ResultCode::KeyNotFound, "record does not exist"))
        }
        (VersionPolicy::ExpectGeneration(expected), Some(record)) if record.generation != expected => {
            Err(ClientError::new(
                ResultCode::GenerationMismatch,
                format!("expected generation {}, found {}", expected, record.generation),
            )
            .with_observed_generation(record.generation))
        }
        _ => Ok(()),
    }
}

fn next_generation(current: Option<&StoredRecord>) -> Generation {
    current.map_or(1, |record| record.generation.wrapping_add(1).max(1))
}

// Null values delete the bin
fn put_bin(bins: &mut Bins, name: &str, value: &Value) {
    if value.is_null() {
        bins.remove(name);
    } else {
        bins.insert(name.to_string(), value.clone());
    }
}

fn bin_type_mismatch(bin: &str, expected: &str, found: &Value) -> ClientError {
    ClientError::new(
        ResultCode::BinTypeMismatch,
        format!("bin '{}' holds {}, operation needs {}", bin, found.type_name(), expected),
    )
}

// ============================================================================
// Client trait implementations
// ============================================================================

impl StorageClient for InMemoryStore {
    fn get(&self, key: &Key) -> Result<Option<ReadRecord>, ClientError> {
        self.count_round_trip();
        Ok(self.read(key))
    }

    fn put(&self, policy: &WritePolicy, key: &Key, bins: &Bins) -> Result<Generation, ClientError> {
        self.count_round_trip();
        self.write_bins(policy, key, bins)
    }

    fn operate(&self, policy: &WritePolicy, key: &Key, ops: &[Operation]) -> Result<ReadRecord, ClientError> {
        self.count_round_trip();
        self.apply(policy, key, ops)
    }

    fn delete(&self, key: &Key) -> Result<bool, ClientError> {
        self.count_round_trip();
        Ok(self.remove(key))
    }

    fn exists(&self, key: &Key) -> Result<bool, ClientError> {
        self.count_round_trip();
        Ok(self.generation_of(key).is_some())
    }

    fn truncate(&self, namespace: &str, set_name: &str) -> Result<(), ClientError> {
        self.count_round_trip();
        self.remove_set(namespace, set_name);
        Ok(())
    }
}

// Each call yields once before touching the map, so the future is
// suspended at least once but the mutation itself is never split.
#[async_trait]
impl AsyncStorageClient for InMemoryStore {
    async fn get(&self, key: &Key) -> Result<Option<ReadRecord>, ClientError> {
        tokio::task::yield_now().await;
        StorageClient::get(self, key)
    }

    async fn put(&self, policy: &WritePolicy, key: &Key, bins: &Bins) -> Result<Generation, ClientError> {
        tokio::task::yield_now().await;
        StorageClient::put(self, policy, key, bins)
    }

    async fn operate(
        &self,
        policy: &WritePolicy,
        key: &Key,
        ops: &[Operation],
    ) -> Result<ReadRecord, ClientError> {
        tokio::task::yield_now().await;
        StorageClient::operate(self, policy, key, ops)
    }

    async fn delete(&self, key: &Key) -> Result<bool, ClientError> {
        tokio::task::yield_now().await;
        StorageClient::delete(self, key)
    }

    async fn exists(&self, key: &Key) -> Result<bool, ClientError> {
        tokio::task::yield_now().await;
        StorageClient::exists(self, key)
    }

    async fn truncate(&self, namespace: &str, set_name: &str) -> Result<(), ClientError> {
        tokio::task::yield_now().await;
        StorageClient::truncate(self, namespace, set_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recmap_core::Expiration;

    fn key(id: &str) -> Key {
        Key::new("test", "things", id)
    }

    fn bins(pairs: &[(&str, Value)]) -> Bins {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_generation_starts_at_one_and_increments() {
        let store = InMemoryStore::new();
        let k = key("a");
        let policy = WritePolicy::new();
        assert_eq!(StorageClient::put(&store, &policy, &k, &bins(&[("x", Value::Int(1))])), Ok(1));
        assert_eq!(StorageClient::put(&store, &policy, &k, &bins(&[("x", Value::Int(2))])), Ok(2));
        assert_eq!(store.generation_of(&k), Some(2));
    }

    #[test]
    fn test_replace_drops_unwritten_bins() {
        let store = InMemoryStore::new();
        let k = key("a");
        StorageClient::put(&store, &WritePolicy::new(), &k, &bins(&[("x", Value::Int(1)), ("y", Value::Int(2))]))
            .unwrap();
        StorageClient::put(&store, &WritePolicy::new(), &k, &bins(&[("x", Value::Int(3))]))
            .unwrap();

        let record = StorageClient::get(&store, &k).unwrap().unwrap();
        assert_eq!(record.bins, bins(&[("x", Value::Int(3))]));
    }

    #[test]
    fn test_merge_keeps_unwritten_bins() {
        let store = InMemoryStore::new();
        let k = key("a");
        StorageClient::put(&store, &WritePolicy::new(), &k, &bins(&[("x", Value::Int(1)), ("y", Value::Int(2))]))
            .unwrap();
        let merge = WritePolicy::new().with_bin_mode(BinMode::Merge);
        StorageClient::put(&store, &merge, &k, &bins(&[("x", Value::Int(3))])).unwrap();

        let record = StorageClient::get(&store, &k).unwrap().unwrap();
        assert_eq!(record.bins, bins(&[("x", Value::Int(3)), ("y", Value::Int(2))]));
    }

    #[test]
    fn test_preconditions() {
        let store = InMemoryStore::new();
        let k = key("a");
        let create = WritePolicy::new().with_version(VersionPolicy::MustNotExist);
        let must_exist = WritePolicy::new().with_version(VersionPolicy::MustExist);

        let err = StorageClient::put(&store, &must_exist, &k, &Bins::new()).unwrap_err();
        assert_eq!(err.code, ResultCode::KeyNotFound);

        assert_eq!(StorageClient::put(&store, &create, &k, &Bins::new()), Ok(1));
        let err = StorageClient::put(&store, &create, &k, &Bins::new()).unwrap_err();
        assert_eq!(err.code, ResultCode::KeyExists);
        assert_eq!(err.observed_generation, Some(1));

        let stale = WritePolicy::new().with_version(VersionPolicy::ExpectGeneration(5));
        let err = StorageClient::put(&store, &stale, &k, &Bins::new()).unwrap_err();
        assert_eq!(err.code, ResultCode::GenerationMismatch);
        assert_eq!(err.observed_generation, Some(1));

        let fresh = WritePolicy::new().with_version(VersionPolicy::ExpectGeneration(1));
        assert_eq!(StorageClient::put(&store, &fresh, &k, &Bins::new()), Ok(2));
    }

    #[test]
    fn test_operate_narrow_ops_with_reads() {
        let store = InMemoryStore::new();
        let k = key("a");
        StorageClient::put(&store, 
                &WritePolicy::new(),
                &k,
                &bins(&[("count", Value::Int(1)), ("name", Value::from("mid"))]),
            )
            .unwrap();

        let record = StorageClient::operate(&store, 
                &WritePolicy::new(),
                &k,
                &[
                    Operation::add("count", 4),
                    Operation::append("name", "-end"),
                    Operation::prepend("name", "start-"),
                    Operation::get("count"),
                    Operation::get("name"),
                ],
            )
            .unwrap();

        assert_eq!(record.generation, 2);
        assert_eq!(record.bin("count"), Some(&Value::Int(5)));
        assert_eq!(record.bin("name"), Some(&Value::from("start-mid-end")));
    }

    #[test]
    fn test_operate_type_mismatch_is_atomic() {
        let store = InMemoryStore::new();
        let k = key("a");
        StorageClient::put(&store, &WritePolicy::new(), &k, &bins(&[("name", Value::from("x")), ("n", Value::Int(1))]))
            .unwrap();

        let err = StorageClient::operate(&store, 
                &WritePolicy::new(),
                &k,
                &[Operation::add("n", 1), Operation::add("name", 1)],
            )
            .unwrap_err();
        assert_eq!(err.code, ResultCode::BinTypeMismatch);

        let record = StorageClient::get(&store, &k).unwrap().unwrap();
        assert_eq!(record.bin("n"), Some(&Value::Int(1)));
        assert_eq!(record.generation, 1);
    }

    #[test]
    fn test_touch_requires_record() {
        let store = InMemoryStore::new();
        let err = StorageClient::operate(&store, &WritePolicy::new(), &key("missing"), &[Operation::Touch, Operation::GetAll])
            .unwrap_err();
        assert_eq!(err.code, ResultCode::KeyNotFound);
    }

    #[test]
    fn test_expiration_and_lazy_purge() {
        let store = InMemoryStore::new();
        let k = key("a");
        let policy = WritePolicy::new().with_expiration(Expiration::Seconds(10));
        StorageClient::put(&store, &policy, &k, &bins(&[("x", Value::Int(1))])).unwrap();

        let record = StorageClient::get(&store, &k).unwrap().unwrap();
        assert_eq!(record.expiration, Some(10));

        store.advance_clock(11);
        assert!(StorageClient::get(&store, &k).unwrap().is_none());
        assert!(!StorageClient::exists(&store, &k).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_expired_record_can_be_recreated() {
        let store = InMemoryStore::with_default_ttl(5);
        let k = key("a");
        let create = WritePolicy::new().with_version(VersionPolicy::MustNotExist);
        StorageClient::put(&store, &create, &k, &Bins::new()).unwrap();
        store.advance_clock(6);
        assert_eq!(StorageClient::put(&store, &create, &k, &Bins::new()), Ok(1));
    }

    #[test]
    fn test_touch_refreshes_ttl() {
        let store = InMemoryStore::new();
        let k = key("a");
        let policy = WritePolicy::new().with_expiration(Expiration::Seconds(10));
        StorageClient::put(&store, &policy, &k, &bins(&[("x", Value::Int(1))])).unwrap();
        store.advance_clock(8);

        let record = StorageClient::operate(&store, &policy, &k, &[Operation::Touch, Operation::GetAll]).unwrap();
        assert_eq!(record.expiration, Some(10));
        assert_eq!(record.generation, 2);
        assert_eq!(record.bin("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_delete_and_round_trips() {
        let store = InMemoryStore::new();
        let k = key("a");
        StorageClient::put(&store, &WritePolicy::new(), &k, &Bins::new()).unwrap();
        assert!(StorageClient::delete(&store, &k).unwrap());
        assert!(!StorageClient::delete(&store, &k).unwrap());
        assert_eq!(store.round_trips(), 3);
    }

    #[test]
    fn test_truncate_removes_only_the_named_set() {
        let store = InMemoryStore::new();
        for id in ["a", "b"] {
            StorageClient::put(&store, &WritePolicy::new(), &key(id), &Bins::new()).unwrap();
        }
        let other_set = Key::new("test", "others", "a");
        let other_namespace = Key::new("prod", "things", "a");
        StorageClient::put(&store, &WritePolicy::new(), &other_set, &Bins::new()).unwrap();
        StorageClient::put(&store, &WritePolicy::new(), &other_namespace, &Bins::new()).unwrap();

        StorageClient::truncate(&store, "test", "things").unwrap();
        assert_eq!(store.len(), 2);
        assert!(!StorageClient::exists(&store, &key("a")).unwrap());
        assert!(StorageClient::exists(&store, &other_set).unwrap());
        assert!(StorageClient::exists(&store, &other_namespace).unwrap());

        StorageClient::truncate(&store, "test", "things").unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_async_client_matches_blocking_behavior() {
        let store = InMemoryStore::new();
        let k = key("a");
        let create = WritePolicy::new().with_version(VersionPolicy::MustNotExist);
        assert_eq!(AsyncStorageClient::put(&store, &create, &k, &Bins::new()).await, Ok(1));
        let err = AsyncStorageClient::put(&store, &create, &k, &Bins::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ResultCode::KeyExists);
        assert!(AsyncStorageClient::exists(&store, &k).await.unwrap());
    }
}
