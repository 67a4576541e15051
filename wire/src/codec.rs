use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::WireError;

/// Names of external (de)serialization helpers the host application wants
/// consulted while decoding a value — e.g. a registry of known value types
/// for a polymorphic `V`. The core never interprets these strings itself;
/// they are threaded through to [`ValueCodec::deserialize`] verbatim.
#[derive(Clone, Debug, Default)]
pub struct Resolvers(Arc<[String]>);

impl Resolvers {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        Resolvers(names.into_iter().collect())
    }

    pub fn empty() -> Self {
        Resolvers(Arc::from(Vec::new()))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

/// The value codec interface consumed by the replication engine. The core
/// does not tie itself to a specific encoding; this crate ships
/// [`BincodeCodec`] as the reference implementation, matching the teacher's
/// use of `bincode::{DefaultOptions, Serializer, Deserializer}` throughout
/// `src/internal_service.rs`.
pub trait ValueCodec: Send + Sync + Clone + 'static {
    fn serialize<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, WireError>;
    fn deserialize<V: DeserializeOwned>(
        &self,
        bytes: &[u8],
        resolvers: &Resolvers,
    ) -> Result<V, WireError>;
}

/// Reference [`ValueCodec`] built on `bincode`, the same crate the teacher
/// uses end to end (`src/lib.rs`, `src/internal_service.rs`).
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl ValueCodec for BincodeCodec {
    fn serialize<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, WireError> {
        bincode::serialize(value).map_err(WireError::Encode)
    }

    fn deserialize<V: DeserializeOwned>(
        &self,
        bytes: &[u8],
        _resolvers: &Resolvers,
    ) -> Result<V, WireError> {
        bincode::deserialize(bytes).map_err(WireError::Decode)
    }
}
