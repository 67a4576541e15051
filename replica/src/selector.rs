//! The backup-selection seam: a configurable strategy object rather than an
//! inheritance hook, per the redesign direction in the distilled design
//! notes. [`RoundRobinSelector`] is the one strategy described in detail;
//! other strategies plug in by implementing [`BackupSelector`].

use membership::Membership;
use wire::MemberId;

/// Chooses which live member(s) back up a freshly-written or freshly
/// re-homed key. Implementations decide how many backups to return;
/// `publishEntryInfo`-style callers in `engine` only assume the result is
/// the backup list to store on the entry.
pub trait BackupSelector: Send + Sync + 'static {
    fn select(&self, membership: &Membership) -> Vec<MemberId>;
}

/// Single-backup round robin over the live membership set, advancing one
/// shared cursor. Two nodes that started from the same cursor state and
/// see the same membership pick the same backup, which is what lets
/// several primaries converge on similar replica placement without
/// coordinating directly.
#[derive(Debug, Default)]
pub struct RoundRobinSelector;

impl BackupSelector for RoundRobinSelector {
    fn select(&self, membership: &Membership) -> Vec<MemberId> {
        let members = membership.all_members();
        match membership.advance_cursor(members.len()) {
            Some(index) => vec![members[index].clone()],
            None => Vec::new(),
        }
    }
}
