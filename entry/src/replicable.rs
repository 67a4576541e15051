use std::time::Instant;

use serde::{Deserialize, Serialize};

use wire::MemberId;

/// A capability interface values may optionally implement to support diff
/// replication and access-only replication. A value that only implements
/// the default methods below is replicated by full value on every change.
///
/// Grounded on the teacher's `Reconcilable` trait (`reconcilable/src/lib.rs`,
/// `src/reconcilable.rs`), generalized from "resolve a conflict" to the
/// fuller diff/access/ownership lifecycle a replicated entry needs. Every
/// `Entry` carries its own lock (see `entry::Entry`), so unlike a
/// lock/unlock-based contract this trait has no locking methods of its
/// own — the entry lock already serializes `apply_diff` against
/// `get_diff`/`reset_diff`; see DESIGN.md.
pub trait Replicable: Send + Sync {
    /// Whether this value's type can emit and apply incremental diffs.
    fn is_diffable(&self) -> bool {
        false
    }

    /// Whether the value has unreplicated mutations since the last
    /// `reset_diff`.
    fn is_dirty(&self) -> bool {
        false
    }

    /// Whether this value wants `ACCESS` (metadata-only) replication when
    /// it is read but not dirty.
    fn is_access_replicate(&self) -> bool {
        false
    }

    /// Bytes representing the incremental change since the last
    /// `reset_diff`. Only called when `is_diffable()` is true.
    fn get_diff(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Clears accumulated diff state after a successful `BACKUP` send.
    fn reset_diff(&mut self) {}

    /// Applies a remote diff in place. Only called when `is_diffable()` is
    /// true and the incoming message carries `diff = true`.
    fn apply_diff(&mut self, _bytes: &[u8]) -> Result<(), ReplicableError> {
        Err(ReplicableError::DiffUnsupported)
    }

    /// Called whenever an entry holding this value is promoted to PRIMARY.
    /// A no-op default; types that care about ownership override it.
    fn set_owner(&mut self, _owner: MemberId) {}

    /// Called on `ACCESS`/`NOTIFY_MAPMEMBER` receipt when this value wants
    /// to track access recency.
    fn access_entry(&mut self) {}

    fn set_last_time_replicated(&mut self, _ts: Instant) {}
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicableError {
    #[error("value type does not support diff application")]
    DiffUnsupported,
    #[error("failed to apply diff: {0}")]
    Malformed(String),
}

/// Blanket wrapper for values that only want full-value replication and
/// have no diff/access semantics of their own — `impl Replicable for T {}`
/// would also work, but most callers reach for this instead of writing an
/// empty impl block, the way the teacher reaches for its `(DateTime<Utc>, V)`
/// tuple impl of `Reconcilable` (`src/reconcilable.rs`) rather than asking
/// every value type to implement the trait by hand.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plain<V>(pub V);

impl<V: Send + Sync> Replicable for Plain<V> {}
