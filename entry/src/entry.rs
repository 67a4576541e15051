use std::time::Instant;

use parking_lot::RwLock;
use wire::MemberId;

use crate::replicable::Replicable;
use crate::role::Role;

/// Mutable half of an entry: everything but the key, which never changes
/// once the entry exists.
struct EntryState<V> {
    value: Option<V>,
    role: Role,
    primary: Option<MemberId>,
    backups: Vec<MemberId>,
    last_replicated: Option<Instant>,
}

/// A single map entry. Fields are guarded by one `RwLock`, which also acts
/// as the entry's lock: a writer holding the write guard while applying a
/// diff cannot interleave with another writer emitting one.
///
/// Grounded on the teacher's per-value locking discipline in
/// `src/internal_service.rs` (`Arc<RwLock<M>>` around the whole map) but
/// pushed down to per-entry granularity, so a lookup of one key never
/// blocks on replication work for another.
pub struct Entry<K, V> {
    key: K,
    state: RwLock<EntryState<V>>,
}

impl<K, V> Entry<K, V> {
    /// A brand-new PRIMARY entry, as created by a local `put`.
    pub fn new_primary(key: K, value: V, local: MemberId) -> Self {
        Entry {
            key,
            state: RwLock::new(EntryState {
                value: Some(value),
                role: Role::Primary,
                primary: Some(local),
                backups: Vec::new(),
                last_replicated: None,
            }),
        }
    }

    /// An entry created from an inbound PROXY/BACKUP/COPY message, or during
    /// state transfer.
    pub fn new_remote(
        key: K,
        role: Role,
        value: Option<V>,
        primary: Option<MemberId>,
        backups: Vec<MemberId>,
    ) -> Self {
        Entry {
            key,
            state: RwLock::new(EntryState {
                value,
                role,
                primary,
                backups,
                last_replicated: None,
            }),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn role(&self) -> Role {
        self.state.read().role
    }

    pub fn is_active(&self) -> bool {
        self.state.read().role.is_active()
    }

    pub fn primary(&self) -> Option<MemberId> {
        self.state.read().primary.clone()
    }

    pub fn backups(&self) -> Vec<MemberId> {
        self.state.read().backups.clone()
    }

    pub fn has_value(&self) -> bool {
        self.state.read().value.is_some()
    }

    pub fn last_replicated(&self) -> Option<Instant> {
        self.state.read().last_replicated
    }

    pub fn set_last_replicated(&self, ts: Instant) {
        self.state.write().last_replicated = Some(ts);
    }

    pub fn set_backups(&self, backups: Vec<MemberId>) {
        self.state.write().backups = backups;
    }

    pub fn set_primary(&self, primary: Option<MemberId>) {
        self.state.write().primary = primary;
    }

    pub fn set_role(&self, role: Role) {
        self.state.write().role = role;
    }
}

impl<K, V: Clone> Entry<K, V> {
    pub fn value_clone(&self) -> Option<V> {
        self.state.read().value.clone()
    }
}

impl<K, V: Replicable> Entry<K, V> {
    pub fn is_diffable(&self) -> bool {
        self.state
            .read()
            .value
            .as_ref()
            .map(Replicable::is_diffable)
            .unwrap_or(false)
    }

    pub fn is_dirty(&self) -> bool {
        self.state
            .read()
            .value
            .as_ref()
            .map(Replicable::is_dirty)
            .unwrap_or(false)
    }

    pub fn is_access_replicate(&self) -> bool {
        self.state
            .read()
            .value
            .as_ref()
            .map(Replicable::is_access_replicate)
            .unwrap_or(false)
    }

    /// Locks the entry and runs `f` with mutable access to the value.
    pub fn with_value_mut<R>(&self, f: impl FnOnce(&mut Option<V>) -> R) -> R {
        let mut guard = self.state.write();
        f(&mut guard.value)
    }

    pub fn with_value<R>(&self, f: impl FnOnce(Option<&V>) -> R) -> R {
        let guard = self.state.read();
        f(guard.value.as_ref())
    }

    /// Promotes to PRIMARY, clearing backup/proxy/copy state and stamping
    /// `primary = local`. Returns the value so the caller can notify it of
    /// the ownership change without re-taking the lock.
    pub fn promote_to_primary(&self, local: MemberId) -> Option<V>
    where
        V: Clone,
    {
        let mut guard = self.state.write();
        guard.role = Role::Primary;
        guard.primary = Some(local.clone());
        guard.value.as_mut().map(|v| v.set_owner(local));
        guard.value.clone()
    }

    pub fn access_entry(&self) {
        if let Some(v) = self.state.write().value.as_mut() {
            v.access_entry();
        }
    }

    pub fn set_owner(&self, owner: MemberId) {
        if let Some(v) = self.state.write().value.as_mut() {
            v.set_owner(owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replicable::Plain;

    fn member(s: &str) -> MemberId {
        MemberId::new(s.to_string())
    }

    #[test]
    fn new_primary_is_active_and_primary() {
        let e = Entry::new_primary("k".to_string(), Plain("v".to_string()), member("a"));
        assert_eq!(e.role(), Role::Primary);
        assert!(e.is_active());
        assert_eq!(e.primary(), Some(member("a")));
        assert!(e.backups().is_empty());
    }

    #[test]
    fn proxy_entry_is_not_active_but_has_no_value() {
        let e: Entry<String, Plain<String>> = Entry::new_remote(
            "k".to_string(),
            Role::Proxy,
            None,
            Some(member("a")),
            vec![member("b")],
        );
        assert!(!e.is_active());
        assert!(!e.has_value());
        assert_eq!(e.backups(), vec![member("b")]);
    }

    #[test]
    fn promote_to_primary_clears_role_and_stamps_local() {
        let e = Entry::new_remote(
            "k".to_string(),
            Role::Backup,
            Some(Plain("v".to_string())),
            Some(member("a")),
            Vec::new(),
        );
        let value = e.promote_to_primary(member("b"));
        assert_eq!(value, Some(Plain("v".to_string())));
        assert_eq!(e.role(), Role::Primary);
        assert_eq!(e.primary(), Some(member("b")));
    }

    #[test]
    fn promote_to_primary_with_no_value_returns_none() {
        let e: Entry<String, Plain<String>> =
            Entry::new_remote("k".to_string(), Role::Proxy, None, None, Vec::new());
        assert_eq!(e.promote_to_primary(member("b")), None);
        // role still flips even though there was nothing to hand back.
        assert_eq!(e.role(), Role::Primary);
    }
}
