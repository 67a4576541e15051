//! The message dispatcher (component E): inbound handling for every wire
//! message type, mutating entries per the rules that parallel the
//! teacher's `handle_messages` in `src/internal_service.rs` and
//! `reconcile-service/src/lib.rs` — generalized from a two-message
//! (comparison/update) protocol to the full envelope lattice this map
//! speaks.

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use entry::{Entry, Replicable, Role};
use wire::{MemberId, Message, MessageType, ValueCodec};

use crate::map::ReplicatedMap;
use crate::state::LifecycleState;
use crate::transport::local::Inbound;
use crate::transport::GroupChannel;

/// One entry's worth of state-transfer payload. Carried as raw bincode
/// inside a STATE/STATE_COPY reply's `value` field rather than as a new
/// field on [`wire::Message`], so the wire envelope stays generic and this
/// crate-specific batching stays local to the lifecycle/dispatcher pair
/// that produces and consumes it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub(crate) struct StateEntry {
    pub(crate) key_bytes: Vec<u8>,
    pub(crate) value_bytes: Option<Vec<u8>>,
    pub(crate) primary: Option<MemberId>,
    pub(crate) backups: Vec<MemberId>,
}

impl<K, V, C, Ch> ReplicatedMap<K, V, C, Ch>
where
    K: Clone + Eq + Hash + Send + Sync + Serialize + DeserializeOwned + 'static,
    V: Replicable + Clone + Serialize + DeserializeOwned + 'static,
    C: ValueCodec,
    Ch: GroupChannel,
{
    pub(crate) fn ensure_entry(
        &self,
        key: &K,
        role: Role,
        primary: Option<MemberId>,
        backups: Vec<MemberId>,
    ) -> Arc<Entry<K, V>> {
        if let Some(existing) = self.entry_for(key) {
            existing.set_role(role);
            existing.set_primary(primary);
            existing.set_backups(backups);
            existing
        } else {
            let entry = Arc::new(Entry::new_remote(key.clone(), role, None, primary, backups));
            self.inner.entries.insert(key.clone(), entry.clone());
            entry
        }
    }

    async fn handle_proxy(&self, key: K, primary: Option<MemberId>, backups: Vec<MemberId>) {
        let entry = self.ensure_entry(&key, Role::Proxy, primary, backups);
        entry.with_value_mut(|slot| *slot = None);
    }

    /// Shared by BACKUP and COPY: both create-or-update the entry and
    /// apply the carried value the same way, differing only in which role
    /// they install.
    async fn handle_replica_update(
        &self,
        key: K,
        role: Role,
        primary: Option<MemberId>,
        backups: Vec<MemberId>,
        value_bytes: Option<Vec<u8>>,
        diff: bool,
        diff_bytes: Option<Vec<u8>>,
    ) {
        let entry = self.ensure_entry(&key, role, primary.clone(), backups);

        if diff {
            if let Some(bytes) = diff_bytes {
                let applied = entry.with_value_mut(|slot| match slot.as_mut() {
                    Some(value) => value.apply_diff(&bytes),
                    None => Err(entry::ReplicableError::DiffUnsupported),
                });
                if let Err(err) = applied {
                    warn!(error = %err, "failed to apply diff, dropping update");
                }
            }
        } else if let Some(bytes) = value_bytes {
            match self
                .inner
                .codec
                .deserialize::<V>(&bytes, &self.inner.config.resolvers)
            {
                Ok(value) => entry.with_value_mut(|slot| *slot = Some(value)),
                Err(err) => warn!(error = %err, "failed to decode replicated value"),
            }
        }
        // A nil value with diff=false keeps whatever value is already there.

        if let Some(primary) = primary {
            entry.set_owner(primary);
        }
    }

    fn handle_remove(&self, key: &K) {
        self.inner.entries.remove(key);
    }

    fn handle_access_or_notify(&self, key: &K, primary: Option<MemberId>, backups: Vec<MemberId>) {
        let Some(entry) = self.entry_for(key) else {
            return;
        };
        if primary.is_some() {
            entry.set_primary(primary);
        }
        if !backups.is_empty() {
            entry.set_backups(backups);
        }
        entry.access_entry();
    }

    fn handle_init(&self, from: &MemberId) -> Message {
        self.inner.membership.touch(from);
        Message::new(self.inner.config.map_id().to_vec(), MessageType::Init)
            .with_primary(self.local_member())
    }

    async fn handle_start(&self, from: MemberId, announced_primary: Option<MemberId>) -> Message {
        let announced = announced_primary.unwrap_or(from);
        self.member_added(announced).await;
        Message::new(self.inner.config.map_id().to_vec(), MessageType::Start)
            .with_primary(self.local_member())
    }

    fn handle_stop(&self, from: MemberId, announced_primary: Option<MemberId>) {
        self.member_disappeared(announced_primary.unwrap_or(from));
    }

    fn handle_ping(&self) -> Message {
        let state = *self.inner.lifecycle.lock();
        let mut msg = Message::new(self.inner.config.map_id().to_vec(), MessageType::Ping)
            .with_primary(self.local_member());
        msg.lifecycle = Some(state.as_wire_byte());
        msg
    }

    /// Builds the PROXY (state=false) or COPY (state=true) snapshot used
    /// to answer a STATE/STATE_COPY request, under the state mutex so it
    /// cannot interleave with the member-added rescan pass.
    pub(crate) async fn handle_state_request(&self, with_values: bool) -> Message {
        let _guard = self.inner.state_mutex.lock().await;
        let mut batch = Vec::new();
        for item in self.inner.entries.iter() {
            let e = item.value();
            let Ok(key_bytes) = self.inner.codec.serialize(item.key()) else {
                continue;
            };
            let value_bytes = if with_values {
                e.value_clone()
                    .and_then(|v| self.inner.codec.serialize(&v).ok())
            } else {
                None
            };
            batch.push(StateEntry {
                key_bytes,
                value_bytes,
                primary: e.primary(),
                backups: e.backups(),
            });
        }
        let kind = if with_values {
            MessageType::StateCopy
        } else {
            MessageType::State
        };
        let mut msg = Message::new(self.inner.config.map_id().to_vec(), kind);
        msg.value = bincode::serialize(&batch).ok();
        msg
    }
}

#[async_trait]
impl<K, V, C, Ch> Inbound for ReplicatedMap<K, V, C, Ch>
where
    K: Clone + Eq + Hash + Send + Sync + Serialize + DeserializeOwned + 'static,
    V: Replicable + Clone + Serialize + DeserializeOwned + 'static,
    C: ValueCodec,
    Ch: GroupChannel,
{
    async fn handle(&self, from: MemberId, message: Message) -> Option<Message> {
        if let Err(err) = message.check_map_id(self.inner.config.map_id()) {
            warn!(error = %err, from = %from, "dropping message for foreign map");
            return None;
        }
        let resolvers = &self.inner.config.resolvers;

        match message.kind {
            MessageType::Init => Some(self.handle_init(&from)),
            MessageType::Start => Some(self.handle_start(from, message.primary.clone()).await),
            MessageType::Stop => {
                self.handle_stop(from, message.primary.clone());
                None
            }
            MessageType::State => Some(self.handle_state_request(false).await),
            MessageType::StateCopy => Some(self.handle_state_request(true).await),
            MessageType::Proxy => {
                match message.decode_key::<C, K>(&self.inner.codec, resolvers) {
                    Ok(Some(key)) => {
                        self.handle_proxy(key, message.primary.clone(), message.backups.clone())
                            .await;
                    }
                    _ => warn!("dropping PROXY with undecodable key"),
                }
                None
            }
            MessageType::Backup | MessageType::Copy => {
                let role = if message.kind == MessageType::Backup {
                    Role::Backup
                } else {
                    Role::Copy
                };
                match message.decode_key::<C, K>(&self.inner.codec, resolvers) {
                    Ok(Some(key)) => {
                        self.handle_replica_update(
                            key,
                            role,
                            message.primary.clone(),
                            message.backups.clone(),
                            message.value.clone(),
                            message.diff,
                            message.diff_bytes.clone(),
                        )
                        .await;
                    }
                    _ => warn!(kind = ?message.kind, "dropping replica update with undecodable key"),
                }
                None
            }
            MessageType::RetrieveBackup => {
                let key = message.decode_key::<C, K>(&self.inner.codec, resolvers).ok().flatten()?;
                let value = self.entry_for(&key).and_then(|e| e.value_clone())?;
                self.encode(MessageType::Backup, &key, Some(&value))
            }
            MessageType::Remove => {
                if let Ok(Some(key)) = message.decode_key::<C, K>(&self.inner.codec, resolvers) {
                    self.handle_remove(&key);
                }
                None
            }
            MessageType::Access | MessageType::NotifyMapMember => {
                if let Ok(Some(key)) = message.decode_key::<C, K>(&self.inner.codec, resolvers) {
                    self.handle_access_or_notify(
                        &key,
                        message.primary.clone(),
                        message.backups.clone(),
                    );
                }
                None
            }
            MessageType::Ping => {
                if let Some(byte) = message.lifecycle {
                    if LifecycleState::from_wire_byte(byte) == Some(LifecycleState::Initialized) {
                        self.inner.membership.touch(&from);
                    }
                }
                Some(self.handle_ping())
            }
        }
    }
}
