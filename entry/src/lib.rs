//! Per-key entry state and the `Replicable` capability values opt into for
//! diff-based replication.
//!
//! Grounded on the teacher's `Reconcilable` trait and its tuple impl over
//! `(DateTime<Utc>, V)` (`reconcilable/src/lib.rs`, `src/reconcilable.rs`),
//! generalized to the role/ownership lifecycle a replicated map entry needs
//! beyond last-write-wins conflict resolution.

mod entry;
mod replicable;
mod role;

pub use entry::Entry;
pub use replicable::{Plain, Replicable, ReplicableError};
pub use role::Role;
