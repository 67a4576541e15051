//! The replication engine (component D): local map operations and the
//! outbound side of replication. Inbound handling lives in `dispatcher`;
//! the two share the same entry storage through `ReplicatedMap`.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use entry::{Entry, Replicable, Role};
use wire::{MemberId, Message, MessageType, ValueCodec};

use crate::map::{Inner, ReplicatedMap};
use crate::transport::{GroupChannel, RpcMode};

/// Encodes a key (and optional value) into a fresh message for this map's
/// context id. Failures are logged and turned into `None` rather than
/// propagated — per the surface policy, outbound encode failures never
/// reach a caller of `put`/`get`/`remove`.
fn encode_message<K, V, C, Ch>(
    inner: &Inner<K, V, C, Ch>,
    kind: MessageType,
    key: &K,
    value: Option<&V>,
) -> Option<Message>
where
    K: Serialize,
    V: Serialize,
    C: ValueCodec,
{
    let msg = Message::new(inner.config.map_id().to_vec(), kind);
    let msg = match msg.with_key(&inner.codec, key) {
        Ok(msg) => msg,
        Err(err) => {
            warn!(error = %err, "failed to encode key, dropping message");
            return None;
        }
    };
    match value {
        None => Some(msg),
        Some(value) => match msg.with_value(&inner.codec, value) {
            Ok(msg) => Some(msg),
            Err(err) => {
                warn!(error = %err, "failed to encode value, dropping message");
                None
            }
        },
    }
}

impl<K, V, C, Ch> ReplicatedMap<K, V, C, Ch>
where
    K: Clone + Eq + Hash + Send + Sync + Serialize + DeserializeOwned + 'static,
    V: Replicable + Clone + Serialize + DeserializeOwned + 'static,
    C: ValueCodec,
    Ch: GroupChannel,
{
    pub(crate) fn encode(&self, kind: MessageType, key: &K, value: Option<&V>) -> Option<Message> {
        encode_message(&self.inner, kind, key, value)
    }

    pub(crate) fn entry_for(&self, key: &K) -> Option<Arc<Entry<K, V>>> {
        self.inner.entries.get(key).map(|e| e.value().clone())
    }

    pub(crate) fn notify_owner(&self, key: &K, value: &V) {
        if let Some(owner) = self.inner.owner.read().as_ref() {
            owner.object_made_primary(key, value);
        }
    }

    /// Sends the chosen backup a full-value BACKUP and every other live
    /// member a metadata-only PROXY, off the calling task so `put`/`get`
    /// never block on network I/O (the teacher's `insert` does the same
    /// with `tokio::spawn` in `src/internal_service.rs`).
    fn spawn_publish_entry_info(&self, key: K, value: V, backups: Vec<MemberId>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let local = inner.config.local.clone();
            let live = inner.membership.live_members(inner.config.access_timeout);
            for member in &live {
                let msg = if backups.contains(member) {
                    encode_message(&inner, MessageType::Backup, &key, Some(&value))
                } else {
                    encode_message::<K, V, C, Ch>(&inner, MessageType::Proxy, &key, None)
                };
                let Some(msg) = msg else { continue };
                let msg = msg.with_primary(local.clone()).with_backups(backups.clone());
                if let Err(err) = inner.channel.send(member, msg).await {
                    warn!(error = %err, member = %member, "failed to publish entry info");
                }
            }
        });
    }

    /// Picks backups for `key` and fans out the BACKUP/PROXY pair.
    /// Selection itself is synchronous (a cursor bump, no I/O); only the
    /// delivery is backgrounded.
    fn publish_entry_info(&self, key: &K, value: &V) -> Vec<MemberId> {
        let backups = self.inner.selector.select(&self.inner.membership);
        self.spawn_publish_entry_info(key.clone(), value.clone(), backups.clone());
        backups
    }

    /// Local write. Replaces any existing entry for `key` first.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.put_notify(key, value, true)
    }

    pub fn put_notify(&self, key: K, value: V, notify: bool) -> Option<V> {
        let previous = if self.inner.entries.contains_key(&key) {
            self.remove_notify(&key, notify)
        } else {
            None
        };

        let local = self.local_member();
        let backups = if notify {
            self.publish_entry_info(&key, &value)
        } else {
            Vec::new()
        };

        let stored = Entry::new_primary(key.clone(), value, local);
        stored.set_backups(backups);
        self.inner.entries.insert(key, Arc::new(stored));

        previous
    }

    /// Inserts every pair from `entries`, each through the normal
    /// replicated `put` path. There is no batching at the wire level —
    /// this is sugar over repeated `put`, exactly as many `Map::putAll`
    /// implementations are sugar over repeated `put`.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        for (key, value) in entries {
            self.put(key, value);
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.remove_notify(key, true)
    }

    pub fn remove_notify(&self, key: &K, notify: bool) -> Option<V> {
        let (_, entry) = self.inner.entries.remove(key)?;
        let previous = entry.value_clone();
        if notify {
            let inner = self.inner.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let live = inner.membership.live_members(inner.config.access_timeout);
                if live.is_empty() {
                    return;
                }
                let Some(msg) = encode_message::<K, V, C, Ch>(&inner, MessageType::Remove, &key, None)
                else {
                    return;
                };
                for member in &live {
                    if let Err(err) = inner.channel.send(member, msg.clone()).await {
                        warn!(error = %err, member = %member, "failed to broadcast remove");
                    }
                }
            });
        }
        previous
    }

    /// Reads `key`, promoting the local entry to PRIMARY if it was not
    /// already one. The promotion path differs by the entry's prior role;
    /// see the module-level handling for each below.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entry = self.inner.entries.get(key)?.value().clone();
        match entry.role() {
            Role::Primary => entry.value_clone(),
            Role::Backup => self.promote_backup(key, &entry).await,
            Role::Proxy => self.promote_proxy(key, &entry).await,
            Role::Copy => self.promote_copy(key, &entry).await,
        }
    }

    async fn promote_backup(&self, key: &K, entry: &Arc<Entry<K, V>>) -> Option<V> {
        entry.value_clone()?;
        let backups = self.inner.selector.select(&self.inner.membership);
        let local = self.local_member();
        let value = entry.promote_to_primary(local)?;
        entry.set_backups(backups.clone());
        self.notify_owner(key, &value);
        self.spawn_publish_entry_info(key.clone(), value.clone(), backups);
        Some(value)
    }

    async fn promote_proxy(&self, key: &K, entry: &Arc<Entry<K, V>>) -> Option<V> {
        let backups = entry.backups();
        if backups.is_empty() {
            return None;
        }
        let msg = self.encode(MessageType::RetrieveBackup, key, None)?;
        let timeout = self.inner.config.rpc_timeout;
        let replies = match self
            .inner
            .channel
            .call(&backups, msg, RpcMode::FirstReply, timeout)
            .await
        {
            Ok(replies) => replies,
            Err(err) => {
                warn!(error = %err, "retrieve-backup RPC failed");
                for member in &err.faulty_members {
                    self.member_disappeared(member.clone());
                }
                return None;
            }
        };

        let value = replies.into_iter().find_map(|reply| {
            reply
                .message
                .decode_value::<C, V>(&self.inner.codec, &self.inner.config.resolvers)
                .ok()
                .flatten()
        });
        let Some(value) = value else {
            warn!("retrieve-backup returned no usable value");
            return None;
        };

        let local = self.local_member();
        entry.with_value_mut(|slot| *slot = Some(value));
        let value = entry.promote_to_primary(local.clone())?;
        entry.set_backups(backups.clone());
        self.notify_owner(key, &value);

        let inner = self.inner.clone();
        let key = key.clone();
        let backups = backups.clone();
        tokio::spawn(async move {
            let local = inner.config.local.clone();
            for member in &backups {
                if let Some(msg) =
                    encode_message::<K, V, C, Ch>(&inner, MessageType::NotifyMapMember, &key, None)
                {
                    let msg = msg.with_primary(local.clone()).with_backups(backups.clone());
                    let _ = inner.channel.send(member, msg).await;
                }
            }
            let live = inner.membership.live_members(inner.config.access_timeout);
            for member in &live {
                if backups.contains(member) {
                    continue;
                }
                if let Some(msg) =
                    encode_message::<K, V, C, Ch>(&inner, MessageType::Proxy, &key, None)
                {
                    let msg = msg.with_primary(local.clone()).with_backups(backups.clone());
                    let _ = inner.channel.send(member, msg).await;
                }
            }
        });

        Some(value)
    }

    async fn promote_copy(&self, key: &K, entry: &Arc<Entry<K, V>>) -> Option<V> {
        entry.value_clone()?;
        let local = self.local_member();
        let value = entry.promote_to_primary(local.clone())?;
        self.notify_owner(key, &value);

        let inner = self.inner.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let live = inner.membership.live_members(inner.config.access_timeout);
            for member in &live {
                if let Some(msg) =
                    encode_message::<K, V, C, Ch>(&inner, MessageType::NotifyMapMember, &key, None)
                {
                    let msg = msg.with_primary(local.clone());
                    let _ = inner.channel.send(member, msg).await;
                }
            }
        });

        Some(value)
    }

    /// Applies `f` to the locally-stored value for `key` under its entry
    /// lock, then returns whatever `f` returns. This is the in-process
    /// stand-in for a caller holding a live mutable reference to a
    /// `Replicable` object and mutating it directly before calling
    /// `replicate` — the shape assumed by §4.1's "lock serializes diff
    /// application against replication emission". Returns `None` if no
    /// entry (or no value) exists for `key`.
    pub fn mutate<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let entry = self.entry_for(key)?;
        entry.with_value_mut(|slot| slot.as_mut().map(f))
    }

    /// Pushes an explicit update for one key, choosing BACKUP (diff or
    /// full) versus ACCESS per the rules in `replicate`.
    pub async fn replicate(&self, key: &K, complete: bool) {
        let Some(entry) = self.inner.entries.get(key).map(|e| e.value().clone()) else {
            return;
        };
        self.replicate_entry(key, &entry, complete).await;
    }

    pub async fn replicate_all(&self, complete: bool) {
        let keys: Vec<K> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.replicate(&key, complete).await;
        }
    }

    async fn replicate_entry(&self, key: &K, entry: &Arc<Entry<K, V>>, complete: bool) {
        if !entry.role().is_primary() || !entry.has_value() {
            return;
        }
        let backups = entry.backups();
        if backups.is_empty() {
            return;
        }

        let msg = if entry.is_diffable() && (complete || entry.is_dirty()) {
            let diff_bytes = entry.with_value_mut(|slot| {
                let diff = slot.as_ref().map(Replicable::get_diff).unwrap_or_default();
                if let Some(value) = slot.as_mut() {
                    value.reset_diff();
                }
                diff
            });
            self.encode(MessageType::Backup, key, None)
                .map(|msg| msg.with_diff_bytes(diff_bytes))
        } else if complete {
            entry
                .value_clone()
                .and_then(|value| self.encode(MessageType::Backup, key, Some(&value)))
        } else if entry.is_access_replicate() && entry.is_dirty() {
            self.encode(MessageType::Access, key, None)
        } else {
            None
        };

        let Some(msg) = msg else { return };
        let local = self.local_member();
        let msg = msg.with_primary(local).with_backups(backups.clone());
        for member in &backups {
            if let Err(err) = self.inner.channel.send(member, msg.clone()).await {
                warn!(error = %err, member = %member, "replicate send failed");
            }
        }
        entry.set_last_replicated(Instant::now());
    }

    /// A new peer announced itself: catch it up on any locally-owned keys
    /// that have no backup yet.
    pub(crate) async fn member_added(&self, member: MemberId) {
        if member == self.local_member() {
            return;
        }
        self.inner.membership.touch(&member);

        let _guard = self.inner.state_mutex.lock().await;
        let unreplicated: Vec<(K, V)> = self
            .inner
            .entries
            .iter()
            .filter(|e| e.value().role().is_primary() && e.value().backups().is_empty())
            .filter_map(|e| e.value().value_clone().map(|v| (e.key().clone(), v)))
            .collect();
        for (key, value) in unreplicated {
            let backups = self.publish_entry_info(&key, &value);
            if let Some(entry) = self.inner.entries.get(&key) {
                entry.value().set_backups(backups);
            }
        }
    }

    /// A peer has gone silent: relocate ownership of anything it backed and
    /// drop orphaned proxies. A backup left with no primary is not
    /// self-promoted here — it stays BACKUP with `primary = nil` until its
    /// next local access, at which point `get`'s `promote_backup` path (the
    /// one promotion path for this transition) picks it up. That keeps
    /// "became primary" and "told the owner about it" a single call site
    /// instead of two.
    pub(crate) fn member_disappeared(&self, member: MemberId) {
        if !self.inner.membership.remove(&member) {
            return;
        }
        let local = self.local_member();
        let keys: Vec<K> = self.inner.entries.iter().map(|e| e.key().clone()).collect();

        for key in keys {
            let Some(entry) = self.inner.entries.get(&key).map(|e| e.value().clone()) else {
                continue;
            };

            if entry.role().is_primary() && entry.backups().contains(&member) {
                let backups = self.inner.selector.select(&self.inner.membership);
                entry.set_backups(backups.clone());
                entry.set_primary(Some(local.clone()));
                if let Some(value) = entry.value_clone() {
                    self.spawn_publish_entry_info(key.clone(), value, backups);
                }
            } else if entry.primary().as_ref() == Some(&member) {
                entry.set_primary(None);
            }

            if entry.role() == Role::Proxy
                && entry.primary().is_none()
                && entry.backups() == vec![member.clone()]
            {
                self.inner.entries.remove(&key);
            }
        }
    }
}
