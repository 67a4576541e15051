use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::{Resolvers, ValueCodec};
use crate::error::WireError;
use crate::member::MemberId;

/// Wire-level message type tag. Numeric values are part of the wire format
/// and must never be renumbered — an older peer decoding a message from a
/// newer one relies on them being stable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Init = 1,
    Start = 2,
    Stop = 3,
    State = 4,
    StateCopy = 5,
    Proxy = 6,
    Copy = 7,
    Backup = 8,
    RetrieveBackup = 9,
    Remove = 10,
    Access = 11,
    NotifyMapMember = 12,
    Ping = 13,
}

/// The tagged envelope carried over the group channel. Keys and values
/// travel as raw, already-encoded bytes so that a dispatcher can route on
/// `kind`/`map_id` without paying to decode a value it may end up dropping
/// (e.g. a `Proxy` announcement for a key nobody locally cares about).
///
/// Modeled after the teacher's bincode-over-the-wire `Message` enum in
/// `src/internal_service.rs`, generalized from a two-variant enum to the
/// full type lattice spec §4.2 requires.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub map_id: Vec<u8>,
    pub kind: MessageType,
    /// True when `diff_bytes` is an incremental diff rather than `value`
    /// being a full snapshot.
    pub diff: bool,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub diff_bytes: Option<Vec<u8>>,
    pub primary: Option<MemberId>,
    pub backups: Vec<MemberId>,
    /// Lifecycle state echoed by PING replies; unused by other message
    /// types.
    pub lifecycle: Option<u8>,
}

impl Message {
    pub fn new(map_id: Vec<u8>, kind: MessageType) -> Self {
        Message {
            map_id,
            kind,
            diff: false,
            key: None,
            value: None,
            diff_bytes: None,
            primary: None,
            backups: Vec::new(),
            lifecycle: None,
        }
    }

    pub fn with_key<C: ValueCodec, K: Serialize>(
        mut self,
        codec: &C,
        key: &K,
    ) -> Result<Self, WireError> {
        self.key = Some(codec.serialize(key)?);
        Ok(self)
    }

    pub fn with_value<C: ValueCodec, V: Serialize>(
        mut self,
        codec: &C,
        value: &V,
    ) -> Result<Self, WireError> {
        self.value = Some(codec.serialize(value)?);
        Ok(self)
    }

    pub fn with_diff_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.diff = true;
        self.diff_bytes = Some(bytes);
        self
    }

    pub fn with_primary(mut self, primary: MemberId) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_backups(mut self, backups: Vec<MemberId>) -> Self {
        self.backups = backups;
        self
    }

    /// Accepted only when the map-id byte-matches the local one.
    pub fn belongs_to(&self, local_map_id: &[u8]) -> bool {
        self.map_id == local_map_id
    }

    /// Same check as [`Message::belongs_to`], but reified as an error so a
    /// dispatcher can log and drop through the same `WireError` path as a
    /// decode failure rather than a bare bool.
    pub fn check_map_id(&self, local_map_id: &[u8]) -> Result<(), WireError> {
        if self.belongs_to(local_map_id) {
            Ok(())
        } else {
            Err(WireError::MapIdMismatch {
                expected: local_map_id.to_vec(),
                got: self.map_id.clone(),
            })
        }
    }

    /// Decodes the key lazily, on first access, using the configured
    /// external resolvers.
    pub fn decode_key<C: ValueCodec, K: DeserializeOwned>(
        &self,
        codec: &C,
        resolvers: &Resolvers,
    ) -> Result<Option<K>, WireError> {
        self.key
            .as_deref()
            .map(|bytes| codec.deserialize(bytes, resolvers))
            .transpose()
    }

    pub fn decode_value<C: ValueCodec, V: DeserializeOwned>(
        &self,
        codec: &C,
        resolvers: &Resolvers,
    ) -> Result<Option<V>, WireError> {
        self.value
            .as_deref()
            .map(|bytes| codec.deserialize(bytes, resolvers))
            .transpose()
    }

    /// A zero-length value payload marks the receiving entry as a lazy
    /// proxy.
    pub fn is_empty_value(&self) -> bool {
        matches!(&self.value, None) || matches!(&self.value, Some(v) if v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BincodeCodec;

    #[test]
    fn belongs_to_is_byte_exact() {
        let msg = Message::new(b"map-a".to_vec(), MessageType::Ping);
        assert!(msg.belongs_to(b"map-a"));
        assert!(!msg.belongs_to(b"map-b"));
        assert!(!msg.belongs_to(b"map-A"));
    }

    #[test]
    fn key_and_value_round_trip_through_bincode() {
        let codec = BincodeCodec;
        let resolvers = Resolvers::empty();
        let msg = Message::new(b"m".to_vec(), MessageType::Backup)
            .with_key(&codec, &"k1".to_string())
            .unwrap()
            .with_value(&codec, &42u32)
            .unwrap();

        let key: Option<String> = msg.decode_key(&codec, &resolvers).unwrap();
        let value: Option<u32> = msg.decode_value(&codec, &resolvers).unwrap();
        assert_eq!(key, Some("k1".to_string()));
        assert_eq!(value, Some(42));
    }

    #[test]
    fn message_with_no_value_is_empty() {
        let msg = Message::new(b"m".to_vec(), MessageType::Proxy);
        assert!(msg.is_empty_value());
    }

    #[test]
    fn diff_bytes_set_diff_flag() {
        let msg = Message::new(b"m".to_vec(), MessageType::Backup).with_diff_bytes(vec![1, 2, 3]);
        assert!(msg.diff);
        assert_eq!(msg.diff_bytes, Some(vec![1, 2, 3]));
    }
}
