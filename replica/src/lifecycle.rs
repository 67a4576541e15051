//! The lifecycle coordinator (component F): init, state transfer, heartbeat,
//! and teardown. Grounded on the teacher's startup/shutdown sequence in
//! `src/main.rs` and `src/internal_service.rs` (bind socket, discover peers,
//! run a periodic task, clean up on exit), generalized from a fixed
//! two-peer UDP handshake to a broadcast INIT/START sequence over an
//! arbitrary membership.

use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use entry::Replicable;
use wire::{Message, MessageType, ValueCodec};

use crate::config::StateTransferKind;
use crate::dispatcher::StateEntry;
use crate::error::MapError;
use crate::map::ReplicatedMap;
use crate::state::LifecycleState;
use crate::transport::local::Inbound;
use crate::transport::{GroupChannel, RpcMode};

impl<K, V, C, Ch> ReplicatedMap<K, V, C, Ch>
where
    K: Clone + Eq + Hash + Send + Sync + Serialize + DeserializeOwned + 'static,
    V: Replicable + Clone + Serialize + DeserializeOwned + 'static,
    C: ValueCodec,
    Ch: GroupChannel,
{
    /// Brings the map up: broadcasts INIT to learn who is out there,
    /// transfers state from an existing peer, broadcasts START, then moves
    /// to `Initialized`. With `terminate`, a failure at either broadcast
    /// step tears nothing down locally but is surfaced to the caller
    /// instead of merely logged.
    pub async fn init(&self, terminate: bool) -> Result<(), MapError> {
        if self.lifecycle_state() == LifecycleState::Destroyed {
            return Err(MapError::Destroyed);
        }

        let known = self.inner.channel.members().await;
        if !known.is_empty() {
            let msg = Message::new(self.inner.config.map_id().to_vec(), MessageType::Init)
                .with_primary(self.local_member());
            match self
                .inner
                .channel
                .call(&known, msg, RpcMode::FirstReply, self.inner.config.rpc_timeout)
                .await
            {
                Ok(replies) => {
                    for reply in &replies {
                        self.inner.membership.touch(&reply.from);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "init broadcast failed");
                    for member in &err.faulty_members {
                        self.member_disappeared(member.clone());
                    }
                    if terminate {
                        return Err(MapError::Init { step: "init", source: err });
                    }
                }
            }
        }

        self.transfer_state().await;

        let live = self
            .inner
            .membership
            .live_members(self.inner.config.access_timeout);
        if !live.is_empty() {
            let msg = Message::new(self.inner.config.map_id().to_vec(), MessageType::Start)
                .with_primary(self.local_member());
            match self
                .inner
                .channel
                .call(&live, msg, RpcMode::FirstReply, self.inner.config.rpc_timeout)
                .await
            {
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "start broadcast failed");
                    for member in &err.faulty_members {
                        self.member_disappeared(member.clone());
                    }
                    if terminate {
                        return Err(MapError::Init { step: "start", source: err });
                    }
                }
            }
        }

        *self.inner.lifecycle.lock() = LifecycleState::Initialized;
        Ok(())
    }

    /// Populates this node from the first known peer. With no peers yet,
    /// there is nothing to transfer; the state still advances so heartbeats
    /// can start once INITIALIZED follows.
    async fn transfer_state(&self) {
        let peer = self.inner.membership.all_members().into_iter().next();
        let Some(peer) = peer else {
            *self.inner.lifecycle.lock() = LifecycleState::StateTransferred;
            return;
        };

        let kind = match self.inner.config.state_transfer_kind {
            StateTransferKind::Proxy => MessageType::State,
            StateTransferKind::Copy => MessageType::StateCopy,
        };
        let msg = Message::new(self.inner.config.map_id().to_vec(), kind)
            .with_primary(self.local_member());

        match self
            .inner
            .channel
            .call(&[peer.clone()], msg, RpcMode::FirstReply, self.inner.config.rpc_timeout)
            .await
        {
            Ok(mut replies) => {
                if let Some(reply) = replies.pop() {
                    self.apply_state_snapshot(peer, reply.message).await;
                }
            }
            Err(err) => {
                warn!(error = %err, peer = %peer, "state transfer failed, starting empty");
                for member in &err.faulty_members {
                    self.member_disappeared(member.clone());
                }
            }
        }

        *self.inner.lifecycle.lock() = LifecycleState::StateTransferred;
    }

    /// Unpacks the batch carried in a STATE/STATE_COPY reply and applies
    /// each entry through the same dispatcher path an inbound PROXY/COPY
    /// message would take, under the state mutex so this cannot interleave
    /// with a concurrent `member_added` rescan.
    async fn apply_state_snapshot(&self, from: wire::MemberId, message: Message) {
        let Some(bytes) = message.value.as_deref() else {
            return;
        };
        let batch: Vec<StateEntry> = match bincode::deserialize(bytes) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "malformed state-transfer snapshot, dropping");
                return;
            }
        };

        let entry_kind = if message.kind == MessageType::StateCopy {
            MessageType::Copy
        } else {
            MessageType::Proxy
        };

        let _guard = self.inner.state_mutex.lock().await;
        for item in batch {
            let mut entry_msg = Message::new(self.inner.config.map_id().to_vec(), entry_kind);
            entry_msg.key = Some(item.key_bytes);
            entry_msg.value = item.value_bytes;
            entry_msg.primary = item.primary;
            entry_msg.backups = item.backups;
            self.handle(from.clone(), entry_msg).await;
        }
    }

    /// Runs one heartbeat cycle if the lifecycle is available: gathers PING
    /// replies to refresh membership timestamps, then evicts anyone who
    /// went silent longer than the access timeout.
    pub async fn heartbeat(&self) {
        if !self.lifecycle_state().is_available() {
            return;
        }
        self.ping().await;
        self.evict_stale();
    }

    async fn ping(&self) {
        let live = self
            .inner
            .membership
            .live_members(self.inner.config.access_timeout);
        if live.is_empty() {
            return;
        }
        let msg = Message::new(self.inner.config.map_id().to_vec(), MessageType::Ping)
            .with_primary(self.local_member());
        match self
            .inner
            .channel
            .call(&live, msg, RpcMode::AllReply, self.inner.config.access_timeout)
            .await
        {
            Ok(replies) => {
                for reply in replies {
                    if let Some(byte) = reply.message.lifecycle {
                        if matches!(
                            LifecycleState::from_wire_byte(byte),
                            Some(LifecycleState::Initialized) | Some(LifecycleState::StateTransferred)
                        ) {
                            self.inner.membership.touch(&reply.from);
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "heartbeat ping failed");
                for member in &err.faulty_members {
                    self.member_disappeared(member.clone());
                }
            }
        }
    }

    fn evict_stale(&self) {
        for member in self
            .inner
            .membership
            .expire_stale(self.inner.config.access_timeout)
        {
            self.member_disappeared(member);
        }
    }

    /// Spawns the periodic heartbeat runner: ticks `heartbeat()` every
    /// `heartbeat_period` until the map reaches `Destroyed`. One of the
    /// three concurrent actors §5 calls out (callers, inbound dispatch,
    /// heartbeat runner); mirrors the always-on loop the teacher's
    /// `main.rs` drives over `answer_queries`, generalized to stop once
    /// `breakdown()` has run instead of running forever.
    pub fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let map = self.clone();
        let period = self.inner.config.heartbeat_period;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if map.lifecycle_state() == LifecycleState::Destroyed {
                    break;
                }
                map.heartbeat().await;
            }
        })
    }

    /// Tears the map down: moves to `Destroyed`, best-effort broadcasts
    /// STOP, deregisters from the transport, and drops all local entries
    /// and membership. Idempotent — a second call is a no-op.
    pub async fn breakdown(&self) {
        {
            let mut state = self.inner.lifecycle.lock();
            if *state == LifecycleState::Destroyed {
                return;
            }
            *state = LifecycleState::Destroyed;
        }

        let live = self
            .inner
            .membership
            .live_members(self.inner.config.access_timeout);
        if !live.is_empty() {
            let msg = Message::new(self.inner.config.map_id().to_vec(), MessageType::Stop)
                .with_primary(self.local_member());
            for member in &live {
                let _ = self.inner.channel.send(member, msg.clone()).await;
            }
        }

        self.inner.channel.deregister().await;
        self.inner.membership.clear();
        self.inner.entries.clear();
    }
}
