//! A cluster-replicated key/value map: per-entry role assignment
//! (primary/backup/proxy/copy), lazy value fetch on read, optional diff
//! replication, and membership-driven relocation of ownership on failover.
//!
//! Grounded throughout on the teacher's `InternalService`/`Service`
//! (`src/internal_service.rs`, `src/service.rs`), generalized from a
//! whole-map last-write-wins reconciliation protocol to per-entry role
//! tracking and multi-node replication over an injected [`GroupChannel`].

mod config;
mod dispatcher;
mod engine;
mod error;
mod lifecycle;
mod map;
mod owner;
mod selector;
mod state;
mod transport;

pub use config::{MapConfig, StateTransferKind};
pub use error::MapError;
pub use map::ReplicatedMap;
pub use owner::MapOwner;
pub use selector::{BackupSelector, RoundRobinSelector};
pub use state::LifecycleState;
pub use transport::local::{Inbound, LocalBus, LocalHub};
pub use transport::{GroupChannel, Reply, RpcMode, TransportError};

pub use entry::{Plain, Replicable, ReplicableError, Role};
pub use wire::{BincodeCodec, MemberId, Message, MessageType, Resolvers, ValueCodec, WireError};
