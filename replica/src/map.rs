use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use entry::{Entry, Replicable, Role};
use membership::Membership;
use wire::{MemberId, ValueCodec};

use crate::config::MapConfig;
use crate::owner::MapOwner;
use crate::selector::{BackupSelector, RoundRobinSelector};
use crate::state::LifecycleState;

/// The inner, `Arc`-shared state every cloned [`ReplicatedMap`] handle
/// points at — the same "one shared instance, cheaply cloned for every
/// task" shape as the teacher's `InternalService`/`Service`
/// (`src/internal_service.rs`, `src/service.rs`), generalized from an
/// `Arc<RwLock<M>>` around one whole map to a `DashMap` of independently
/// lockable entries.
pub(crate) struct Inner<K, V, C, Ch> {
    pub(crate) config: MapConfig,
    pub(crate) codec: C,
    pub(crate) channel: Ch,
    pub(crate) membership: Membership,
    pub(crate) selector: Box<dyn BackupSelector>,
    pub(crate) entries: DashMap<K, Arc<Entry<K, V>>>,
    pub(crate) lifecycle: Mutex<LifecycleState>,
    pub(crate) owner: RwLock<Option<Arc<dyn MapOwner<K, V>>>>,
    /// Guards state-transfer snapshot build/apply against the
    /// rescan-backups pass triggered by membership additions, the two
    /// operations the distilled design calls out as needing mutual
    /// exclusion.
    pub(crate) state_mutex: AsyncMutex<()>,
}

/// A cluster-replicated key/value map. Cloning is cheap (an `Arc` bump);
/// hand copies to as many tasks as you like, mirroring how the teacher's
/// `Service`/`InternalService` are cloned into the socket-reading loop and
/// into caller-facing handles alike.
pub struct ReplicatedMap<K, V, C, Ch> {
    pub(crate) inner: Arc<Inner<K, V, C, Ch>>,
}

impl<K, V, C, Ch> Clone for ReplicatedMap<K, V, C, Ch> {
    fn clone(&self) -> Self {
        ReplicatedMap {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, C, Ch> ReplicatedMap<K, V, C, Ch>
where
    K: Clone + Eq + Hash + Send + Sync + Serialize + DeserializeOwned + 'static,
    V: Replicable + Clone + Serialize + DeserializeOwned + 'static,
    C: ValueCodec,
    Ch: crate::transport::GroupChannel,
{
    pub fn new(config: MapConfig, codec: C, channel: Ch) -> Self {
        Self::with_selector(config, codec, channel, Box::new(RoundRobinSelector))
    }

    pub fn with_selector(
        config: MapConfig,
        codec: C,
        channel: Ch,
        selector: Box<dyn BackupSelector>,
    ) -> Self {
        let membership = Membership::new(config.local.clone());
        ReplicatedMap {
            inner: Arc::new(Inner {
                config,
                codec,
                channel,
                membership,
                selector,
                entries: DashMap::new(),
                lifecycle: Mutex::new(LifecycleState::New),
                owner: RwLock::new(None),
                state_mutex: AsyncMutex::new(()),
            }),
        }
    }

    pub fn set_owner(&self, owner: Arc<dyn MapOwner<K, V>>) {
        *self.inner.owner.write() = Some(owner);
    }

    pub fn local_member(&self) -> MemberId {
        self.inner.config.local.clone()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.inner.lifecycle.lock()
    }

    /// True for every entry regardless of role — a PROXY pointer is still
    /// a hit.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// The entry's current role, if it exists locally. Mainly a diagnostic
    /// hook — ordinary callers go through `get`/`put`/`remove` and never
    /// need to branch on role themselves.
    pub fn role_of(&self, key: &K) -> Option<Role> {
        self.inner.entries.get(key).map(|e| e.value().role())
    }

    /// The backup list currently recorded on an entry, if it exists.
    pub fn backups_of(&self, key: &K) -> Option<Vec<MemberId>> {
        self.inner.entries.get(key).map(|e| e.value().backups())
    }

    /// The primary currently recorded on an entry, if it exists.
    pub fn primary_of(&self, key: &K) -> Option<MemberId> {
        self.inner.entries.get(key).and_then(|e| e.value().primary())
    }

    /// Advisory, O(N): iterates active entries calling `V: PartialEq`.
    /// Locks are not held across the whole scan, so the result is a
    /// snapshot that may already be stale by the time it returns.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.inner.entries.iter().any(|entry| {
            let e = entry.value();
            e.is_active() && e.with_value(|v| v == Some(value))
        })
    }

    /// Count of active entries holding a value.
    pub fn size(&self) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.value().is_active() && entry.value().has_value())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// All entries including PROXY/BACKUP/COPY.
    pub fn size_full(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn key_set(&self) -> Vec<K> {
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.value().is_active() && entry.value().has_value())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn key_set_full(&self) -> Vec<K> {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.inner
            .entries
            .iter()
            .filter_map(|entry| {
                let e = entry.value();
                if e.is_active() {
                    e.value_clone()
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn entry_set(&self) -> Vec<(K, V)> {
        self.inner
            .entries
            .iter()
            .filter_map(|entry| {
                let e = entry.value();
                if e.is_active() {
                    e.value_clone().map(|v| (entry.key().clone(), v))
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn entry_set_full(&self) -> Vec<(K, V)> {
        self.inner
            .entries
            .iter()
            .filter_map(|entry| entry.value().value_clone().map(|v| (entry.key().clone(), v)))
            .collect()
    }

    /// `clear(false)` drops local storage only. `clear(true)` removes each
    /// active key through the replicated `remove` path; entries this node
    /// holds as PROXY/BACKUP are left untouched rather than removed, per
    /// the documented behavior of the distillation this was built from
    /// (see DESIGN.md).
    pub fn clear(&self, notify: bool) {
        if !notify {
            self.inner.entries.clear();
            return;
        }
        for key in self.key_set() {
            self.remove_notify(&key, true);
        }
    }
}
