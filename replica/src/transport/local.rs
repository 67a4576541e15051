//! An in-process [`GroupChannel`] used by the demo binary and integration
//! tests. Stands in for a real reliable-multicast transport the same way a
//! `UdpSocket` bound to `127.0.0.1` stands in for the teacher's LAN peer
//! discovery in `src/internal_service.rs` — minus needing two bindable
//! addresses, and minus any actual network I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tracing::{trace, warn};
use wire::{MemberId, Message, WireError};

use super::{GroupChannel, Reply, RpcMode, TransportError};

const MAX_SEND_RETRIES: u32 = 4;

/// Upper bound on one encoded envelope, mirroring the teacher's fixed
/// `recv_buf` sizing in `src/internal_service.rs` (`handle_messages`
/// discards a datagram when `size == recv_buf.len()` — a full read means
/// the message didn't fit). This in-process bus has no socket to truncate
/// against, so it checks the same bound against the envelope's encoded
/// size before handing it off.
const MAX_FRAME_BYTES: usize = 64 * 1024;

fn check_frame_size(message: &Message) -> Result<(), WireError> {
    match bincode::serialize(message) {
        Ok(bytes) if bytes.len() >= MAX_FRAME_BYTES => Err(WireError::BufferTooSmall),
        Ok(_) => Ok(()),
        Err(_) => Err(WireError::BufferTooSmall),
    }
}

/// Anything that can answer an inbound message, optionally with a reply.
/// A [`ReplicatedMap`](crate::ReplicatedMap)'s dispatcher implements this
/// and registers itself on [`LocalBus::register`] during `init`.
#[async_trait]
pub trait Inbound: Send + Sync + 'static {
    async fn handle(&self, from: MemberId, message: Message) -> Option<Message>;
}

type Registry = Arc<RwLock<HashMap<MemberId, Arc<dyn Inbound>>>>;

/// Shared switchboard several [`LocalBus`] handles join. Construct one per
/// test cluster or demo run; each node gets its own `LocalBus` bound to the
/// same hub.
#[derive(Clone, Default)]
pub struct LocalHub {
    registry: Registry,
}

impl LocalHub {
    pub fn new() -> Self {
        LocalHub::default()
    }

    pub fn bus(&self, local: MemberId) -> LocalBus {
        LocalBus {
            local,
            registry: self.registry.clone(),
        }
    }
}

/// One node's handle onto a [`LocalHub`].
#[derive(Clone)]
pub struct LocalBus {
    local: MemberId,
    registry: Registry,
}

impl LocalBus {
    /// Registers the local dispatcher as this member's inbound handler.
    /// Mirrors the lifecycle coordinator's "register as channel listener"
    /// step.
    pub fn register(&self, inbound: Arc<dyn Inbound>) {
        self.registry.write().insert(self.local.clone(), inbound);
    }

    pub fn deregister(&self) {
        self.registry.write().remove(&self.local);
    }
}

#[async_trait]
impl GroupChannel for LocalBus {
    async fn members(&self) -> Vec<MemberId> {
        self.registry
            .read()
            .keys()
            .filter(|id| **id != self.local)
            .cloned()
            .collect()
    }

    fn local_member(&self) -> MemberId {
        self.local.clone()
    }

    async fn deregister(&self) {
        self.registry.write().remove(&self.local);
    }

    async fn send(&self, to: &MemberId, message: Message) -> Result<(), TransportError> {
        if let Err(err) = check_frame_size(&message) {
            warn!(error = %err, to = %to, "dropping oversized message");
            return Err(TransportError::new(err.to_string()).with_faulty(vec![to.clone()]));
        }

        let mut attempt = 0;
        loop {
            let inbound = self.registry.read().get(to).cloned();
            match inbound {
                Some(inbound) => {
                    trace!(to = %to, "delivering one-way message");
                    let from = self.local.clone();
                    tokio::spawn(async move {
                        let _ = inbound.handle(from, message).await;
                    });
                    return Ok(());
                }
                None => {
                    attempt += 1;
                    if attempt >= MAX_SEND_RETRIES {
                        return Err(
                            TransportError::new(format!("no such member: {to}"))
                                .with_faulty(vec![to.clone()]),
                        );
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
    }

    async fn call(
        &self,
        to: &[MemberId],
        message: Message,
        mode: RpcMode,
        timeout: Duration,
    ) -> Result<Vec<Reply>, TransportError> {
        if let Err(err) = check_frame_size(&message) {
            warn!(error = %err, "dropping oversized rpc message");
            return Err(TransportError::new(err.to_string()).with_faulty(to.to_vec()));
        }

        let mut tasks = JoinSet::new();
        for target in to {
            let target = target.clone();
            let inbound = self.registry.read().get(&target).cloned();
            let from = self.local.clone();
            let message = message.clone();
            tasks.spawn(async move {
                match inbound {
                    Some(inbound) => {
                        match tokio::time::timeout(timeout, inbound.handle(from, message)).await {
                            Ok(Some(reply)) => Some((target, reply)),
                            Ok(None) | Err(_) => None,
                        }
                    }
                    None => None,
                }
            });
        }

        let mut replies = Vec::new();
        let mut answered = std::collections::HashSet::new();
        while let Some(result) = tasks.join_next().await {
            if let Ok(Some((from, message))) = result {
                answered.insert(from.clone());
                replies.push(Reply { from, message });
                if mode == RpcMode::FirstReply {
                    tasks.abort_all();
                    break;
                }
            }
        }

        if replies.is_empty() {
            return Err(TransportError::new("no replies before timeout")
                .with_faulty(to.to_vec()));
        }
        Ok(replies)
    }
}
