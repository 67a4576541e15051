use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifies a map member. Opaque to the protocol beyond equality/ordering;
/// callers typically derive it from whatever the group channel uses (a
/// hostname, a UUID, a socket address rendered to a string).
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(Arc<str>);

impl MemberId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        MemberId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        MemberId::new(s)
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        MemberId::new(s)
    }
}
