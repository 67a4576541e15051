/// Global lifecycle state. Transitions are monotonic; `Destroyed` is
/// terminal. Only `Initialized` is "available" — heartbeats run only in
/// that state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    New,
    StateTransferred,
    Initialized,
    Destroyed,
}

impl LifecycleState {
    pub fn is_available(self) -> bool {
        matches!(self, LifecycleState::Initialized)
    }

    /// Wire-level tag echoed in PING messages.
    pub fn as_wire_byte(self) -> u8 {
        match self {
            LifecycleState::New => 0,
            LifecycleState::StateTransferred => 1,
            LifecycleState::Initialized => 2,
            LifecycleState::Destroyed => 3,
        }
    }

    pub fn from_wire_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(LifecycleState::New),
            1 => Some(LifecycleState::StateTransferred),
            2 => Some(LifecycleState::Initialized),
            3 => Some(LifecycleState::Destroyed),
            _ => None,
        }
    }
}
