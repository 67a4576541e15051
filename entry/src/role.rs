/// An entry's role in the replication protocol: who owns writes, who holds
/// a live copy on standby, and who merely knows where to forward a lookup.
///
/// Modeled as a tagged enum rather than three independent booleans
/// (`backup`/`proxy`/`copy`, with PRIMARY meaning "none set") so every
/// call site matches exhaustively instead of trusting the booleans stay
/// mutually exclusive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Role {
    /// This node owns writes and diff generation for the key.
    Primary,
    /// This node holds the full value on behalf of a primary elsewhere.
    Backup,
    /// Lightweight locator: knows the primary/backups, holds no value.
    Proxy,
    /// Read-only full value distributed during state transfer.
    Copy,
}

impl Role {
    /// A PROXY entry holds no value, just a pointer to the real owner.
    pub fn is_active(self) -> bool {
        !matches!(self, Role::Proxy)
    }

    pub fn is_primary(self) -> bool {
        matches!(self, Role::Primary)
    }
}
