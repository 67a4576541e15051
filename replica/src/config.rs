use std::time::Duration;

use wire::{MemberId, Resolvers};

/// Which snapshot shape a joining node requests during state transfer:
/// lightweight PROXY pointers, or full COPY values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateTransferKind {
    Proxy,
    Copy,
}

/// Typed configuration for a [`crate::ReplicatedMap`], built in code rather
/// than from a config file — grounded in the teacher's explicit constructor
/// parameters (`InternalService::new(map, port, listen_addr, peer_net)`).
/// The demo binary's `clap::Parser` struct maps CLI flags onto this.
#[derive(Clone, Debug)]
pub struct MapConfig {
    pub(crate) local: MemberId,
    pub(crate) map_id: Vec<u8>,
    pub(crate) rpc_timeout: Duration,
    pub(crate) access_timeout: Duration,
    pub(crate) heartbeat_period: Duration,
    pub(crate) state_transfer_kind: StateTransferKind,
    pub(crate) resolvers: Resolvers,
}

impl MapConfig {
    pub fn new(local: MemberId, map_id: impl Into<Vec<u8>>) -> Self {
        MapConfig {
            local,
            map_id: map_id.into(),
            rpc_timeout: Duration::from_secs(2),
            access_timeout: Duration::from_secs(5),
            heartbeat_period: Duration::from_secs(1),
            state_transfer_kind: StateTransferKind::Proxy,
            resolvers: Resolvers::empty(),
        }
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_access_timeout(mut self, timeout: Duration) -> Self {
        self.access_timeout = timeout;
        self
    }

    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    pub fn with_state_transfer_kind(mut self, kind: StateTransferKind) -> Self {
        self.state_transfer_kind = kind;
        self
    }

    pub fn with_resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    pub fn local(&self) -> &MemberId {
        &self.local
    }

    pub fn map_id(&self) -> &[u8] {
        &self.map_id
    }
}
