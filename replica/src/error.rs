use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced across the crate's boundary. Only
/// [`crate::ReplicatedMap::init`] with `terminate = true` ever returns one
/// to its caller; every other public operation logs and degrades instead
/// (see `get`/`put`/`remove`/`replicate`).
#[derive(Debug, Error)]
pub enum MapError {
    #[error("init failed while broadcasting {step}: {source}")]
    Init {
        step: &'static str,
        #[source]
        source: TransportError,
    },

    /// State-transfer RPC failures are never surfaced here — §7 treats a
    /// missing state-transfer reply as "log a warning, treat as no data",
    /// not a lifecycle error, regardless of `terminate`.
    #[error("map already destroyed")]
    Destroyed,
}
