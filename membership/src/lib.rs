//! Tracks which nodes are sharing ownership of a replicated map and which
//! of them have gone silent.
//!
//! Grounded in the teacher's peer table in `src/internal_service.rs`:
//! `peers: Arc<RwLock<HashMap<IpAddr, Instant>>>` plus `get_peers`, which
//! sweeps expired entries on every read. The round-robin `currentNode`
//! cursor used for backup selection lives here too, guarded by the same
//! mutex as the peer table.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;
use wire::MemberId;

/// Tracks live peers on this map-id and the round-robin cursor used for
/// backup selection. A peer is live while
/// `now - last_heard <= access_timeout`.
pub struct Membership {
    local: MemberId,
    peers: Mutex<HashMap<MemberId, Instant>>,
    cursor: Mutex<u64>,
}

impl Membership {
    pub fn new(local: MemberId) -> Self {
        Membership {
            local,
            peers: Mutex::new(HashMap::new()),
            cursor: Mutex::new(0),
        }
    }

    pub fn local(&self) -> &MemberId {
        &self.local
    }

    /// Records/refreshes a peer's last-heard timestamp. Ignores the local
    /// member: a node never tracks itself as a peer.
    pub fn touch(&self, id: &MemberId) {
        if id == &self.local {
            return;
        }
        let now = Instant::now();
        let mut guard = self.peers.lock();
        let is_new = !guard.contains_key(id);
        guard.insert(id.clone(), now);
        if is_new {
            debug!(member = %id, "member added");
        }
    }

    /// Removes a peer unconditionally (explicit STOP, RPC-reported fault,
    /// transport-layer disappearance). Returns whether it was present.
    pub fn remove(&self, id: &MemberId) -> bool {
        let removed = self.peers.lock().remove(id).is_some();
        if removed {
            debug!(member = %id, "member removed");
        }
        removed
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.peers.lock().contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Drops every tracked peer. Used during `breakdown`: once a map is
    /// destroyed it has no membership to speak of.
    pub fn clear(&self) {
        self.peers.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    /// A stable-ordered snapshot of every known peer, live or not.
    pub fn all_members(&self) -> Vec<MemberId> {
        let mut members: Vec<_> = self.peers.lock().keys().cloned().collect();
        members.sort();
        members
    }

    /// Snapshot of peers heard from within `access_timeout`.
    pub fn live_members(&self, access_timeout: Duration) -> Vec<MemberId> {
        let now = Instant::now();
        let mut members: Vec<_> = self
            .peers
            .lock()
            .iter()
            .filter(|(_, last)| now.duration_since(**last) <= access_timeout)
            .map(|(id, _)| id.clone())
            .collect();
        members.sort();
        members
    }

    /// Identifies every peer silent for longer than `access_timeout`,
    /// *without* removing them. Actual removal is the caller's job, via
    /// `remove`/`member_disappeared` — that relocation logic itself needs
    /// to observe the peer still present in order to run (its own first
    /// step is `remove`, which no-ops if the peer is already gone).
    pub fn expire_stale(&self, access_timeout: Duration) -> Vec<MemberId> {
        let now = Instant::now();
        self.peers
            .lock()
            .iter()
            .filter(|(_, last)| now.duration_since(**last) > access_timeout)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Advances the round-robin cursor: read `size`, pick
    /// `node = currentNode++`; if `node >= size`, wrap to `0` and reset the
    /// cursor to `1`. Returns `None` when there is nobody to pick from.
    pub fn advance_cursor(&self, size: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }
        let mut cursor = self.cursor.lock();
        let mut node = *cursor as usize;
        *cursor += 1;
        if node >= size {
            node = 0;
            *cursor = 1;
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn id(s: &str) -> MemberId {
        MemberId::new(s.to_string())
    }

    #[test]
    fn touch_ignores_self() {
        let m = Membership::new(id("a"));
        m.touch(&id("a"));
        assert!(m.is_empty());
    }

    #[test]
    fn expire_stale_identifies_without_removing() {
        let m = Membership::new(id("a"));
        m.touch(&id("b"));
        sleep(Duration::from_millis(20));
        let stale = m.expire_stale(Duration::from_millis(5));
        assert_eq!(stale, vec![id("b")]);
        // still present: removal is the caller's job (`remove`/`member_disappeared`).
        assert!(m.contains(&id("b")));
    }

    #[test]
    fn clear_drops_every_peer() {
        let m = Membership::new(id("a"));
        m.touch(&id("b"));
        m.touch(&id("c"));
        m.clear();
        assert!(m.is_empty());
    }

    #[test]
    fn cursor_wraps_and_resets_on_overflow() {
        let m = Membership::new(id("a"));
        assert_eq!(m.advance_cursor(3), Some(0));
        assert_eq!(m.advance_cursor(3), Some(1));
        assert_eq!(m.advance_cursor(3), Some(2));
        // node (3) >= size (3): wraps to 0, cursor reset to 1
        assert_eq!(m.advance_cursor(3), Some(0));
        assert_eq!(m.advance_cursor(3), Some(1));
    }

    #[test]
    fn cursor_empty_membership_returns_none() {
        let m = Membership::new(id("a"));
        assert_eq!(m.advance_cursor(0), None);
    }
}
