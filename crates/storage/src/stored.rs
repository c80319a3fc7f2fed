//! Storage-layer record
//!
//! `StoredRecord` is what the in-memory store keeps per key: the bins,
//! the generation counter and an absolute expiry time. Callers never see
//! it directly; reads turn it into a `ReadRecord` with the time-to-live
//! expressed as seconds remaining.

use recmap_core::{Bins, Expiration, Generation, Key, ReadRecord};

/// A record as held by the in-memory store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Bin values
    pub bins: Bins,
    /// Write counter, starts at 1 on creation
    pub generation: Generation,
    /// Absolute expiry in unix seconds, `None` to never expire
    pub expires_at: Option<i64>,
}

impl StoredRecord {
    /// Whether the record has expired at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Seconds remaining at `now`, `None` if the record never expires
    pub fn ttl_remaining(&self, now: i64) -> Option<u32> {
        self.expires_at
            .map(|at| (at - now).clamp(0, i64::from(u32::MAX)) as u32)
    }

    /// Header-and-bins view handed to clients
    pub fn to_read_record(&self, key: &Key, bins: Bins, now: i64) -> ReadRecord {
        ReadRecord::new(key.clone(), bins, self.generation, self.ttl_remaining(now))
    }
}

/// Resolve a requested expiration into an absolute expiry time
///
/// `default_ttl` is the store-wide default applied for
/// `Expiration::ServerDefault`; `None` there means never expire.
pub fn expiry_for(expiration: Expiration, default_ttl: Option<u32>, now: i64) -> Option<i64> {
    match expiration {
        Expiration::ServerDefault => default_ttl.map(|ttl| now + i64::from(ttl)),
        Expiration::Never => None,
        Expiration::Seconds(seconds) => Some(now + i64::from(seconds)),
    }
}
