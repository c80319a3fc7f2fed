//! Optimistic concurrency for recmap
//!
//! This crate turns entity writes into single storage calls guarded by the
//! store's generation counter:
//! - Policy resolution: version state + write mode -> precondition
//! - PreparedWrite: the full-record write state machine
//! - NarrowWrite: add/append/prepend on named bins
//! - Batch duplicate detection for `insert_all`
//!
//! Nothing here retries. A rejected write is reported as an
//! optimistic-lock conflict and left to the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod narrow;
pub mod policy;
pub mod protocol;

pub use batch::{duplicate_outcome, find_duplicates};
pub use narrow::{add_ops, append_ops, prepend_ops, NarrowWrite};
pub use policy::{resolve, ResolvedPolicy, WriteMode};
pub use protocol::{classify, PreparedWrite, WriteOutcome, WriteState};
