//! The group-communication transport this crate consumes, never implements
//! for real. `GroupChannel` is the seam; [`local::LocalBus`] is the
//! in-process reference implementation used by the demo binary and the
//! integration tests, playing the role the teacher's `UdpSocket` plays in
//! `src/internal_service.rs`, minus needing two bindable addresses in CI.

pub mod local;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use wire::{MemberId, Message};

pub use local::LocalBus;

/// How an RPC call's replies are gathered.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RpcMode {
    /// Return as soon as the first reply arrives.
    FirstReply,
    /// Wait for a reply from every currently known member (or the timeout).
    AllReply,
}

/// A single RPC reply paired with the member that sent it.
#[derive(Clone, Debug)]
pub struct Reply {
    pub from: MemberId,
    pub message: Message,
}

/// Errors a [`GroupChannel`] implementation may report. `faulty_members` is
/// populated by transports that can attribute a send failure or timeout to
/// specific peers; the lifecycle/dispatcher feeds each one through
/// membership disappearance handling.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub faulty_members: Vec<MemberId>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError {
            message: message.into(),
            faulty_members: Vec::new(),
        }
    }

    pub fn with_faulty(mut self, members: Vec<MemberId>) -> Self {
        self.faulty_members = members;
        self
    }
}

/// The group channel interface consumed by the lifecycle coordinator and
/// replication engine. A real implementation wraps reliable ordered
/// multicast and RPC correlation; none of that machinery is specified
/// here, only the shape a caller needs.
#[async_trait]
pub trait GroupChannel: Send + Sync + 'static {
    /// Live peer ids as the transport currently sees them. This may differ
    /// momentarily from the membership registry this crate maintains; the
    /// registry is the authority for replication decisions.
    async fn members(&self) -> Vec<MemberId>;

    fn local_member(&self) -> MemberId;

    /// Fire-and-forget delivery to one member. Best-effort: the engine
    /// never blocks a caller on this succeeding.
    async fn send(&self, to: &MemberId, message: Message) -> Result<(), TransportError>;

    /// An RPC round trip to one or more members, gathered per `mode`.
    async fn call(
        &self,
        to: &[MemberId],
        message: Message,
        mode: RpcMode,
        timeout: Duration,
    ) -> Result<Vec<Reply>, TransportError>;

    /// Deregisters this member as an inbound listener. Called once from
    /// `breakdown`; a no-op default for transports with nothing to unwind
    /// (e.g. one that discovers listeners by membership rather than by an
    /// explicit registry).
    async fn deregister(&self) {}
}
