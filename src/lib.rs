//! Public façade over the `meshmap` workspace: a cluster-replicated
//! key/value map with per-entry role assignment, lazy value fetch, and
//! membership-driven relocation of ownership.
//!
//! The interesting pieces live in the member crates — `wire` (message
//! envelope and value codec contract), `membership` (peer liveness and
//! backup-selection cursor), `entry` (per-key role state and the
//! `Replicable` diff contract), and `replica` (the replication engine,
//! dispatcher, and lifecycle coordinator). This crate re-exports the
//! surface a caller needs and adds the demo binary in `main.rs`, the way
//! the teacher's root `src/lib.rs` sits over `diff`/`htree`/`reconcilable`/
//! `reconcile-service`.

pub use entry::{Plain, Replicable, ReplicableError, Role};
pub use replica::{
    GroupChannel, Inbound, LifecycleState, LocalBus, LocalHub, MapConfig, MapError, MapOwner,
    BackupSelector, RoundRobinSelector, ReplicatedMap, Reply, RpcMode, StateTransferKind,
    TransportError,
};
pub use wire::{BincodeCodec, MemberId, Message, MessageType, Resolvers, ValueCodec, WireError};
